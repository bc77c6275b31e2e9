//! Resolves the tracker's build-time defaults.
//!
//! Values are taken from the environment, falling back to a `.env` file in
//! the package (or any parent) directory. Once validated they are written to
//! `$OUT_DIR/defaults.rs` as typed constants, which `config.rs` includes.

const UPDATE_RATE_VAR: &str = "LIGHTNING_UPDATE_RATE_MIN";
const UTC_OFFSET_VAR: &str = "LIGHTNING_UTC_OFFSET_SECS";

const DEFAULT_UPDATE_RATE_MIN: u8 = 6;
const DEFAULT_UTC_OFFSET_SECS: i32 = 0;

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed={UPDATE_RATE_VAR}");
    println!("cargo:rerun-if-env-changed={UTC_OFFSET_VAR}");

    // A missing .env file is fine, the built-in defaults apply.
    let _ = dotenvy::dotenv();

    let rate = match std::env::var(UPDATE_RATE_VAR) {
        Ok(raw) => raw
            .trim()
            .parse::<u8>()
            .unwrap_or_else(|_| panic!("{UPDATE_RATE_VAR} must be an integer, got {raw:?}")),
        Err(_) => DEFAULT_UPDATE_RATE_MIN,
    };
    if rate == 0 || rate > 60 || 60 % rate != 0 {
        panic!("{UPDATE_RATE_VAR}={rate} must evenly divide 60 minutes");
    }

    let offset = match std::env::var(UTC_OFFSET_VAR) {
        Ok(raw) => raw
            .trim()
            .parse::<i32>()
            .unwrap_or_else(|_| panic!("{UTC_OFFSET_VAR} must be an integer, got {raw:?}")),
        Err(_) => DEFAULT_UTC_OFFSET_SECS,
    };
    if offset.unsigned_abs() > 14 * 3600 {
        panic!("{UTC_OFFSET_VAR}={offset} is outside the valid UTC offset range");
    }

    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let defaults = format!(
        "/// Default update interval in minutes, from `{UPDATE_RATE_VAR}`\n\
         pub const DEFAULT_UPDATE_RATE_MIN: u8 = {rate};\n\
         \n\
         /// Default offset of local time from UTC in seconds, from `{UTC_OFFSET_VAR}`\n\
         pub const DEFAULT_UTC_OFFSET_SECS: i32 = {offset};\n"
    );
    std::fs::write(std::path::Path::new(&out_dir).join("defaults.rs"), defaults)
        .expect("failed to write defaults.rs");
}
