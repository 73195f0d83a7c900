pub mod dlt;
pub mod source;
pub mod supervisor;
pub mod utils;

pub fn name() -> &'static str {
    "pardlt"
}
pub fn version() -> (u32, u32, u32) {
    const VERSION_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
    const VERSION_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
    const VERSION_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");
    (
        VERSION_MAJOR.parse::<u32>().unwrap_or(0),
        VERSION_MINOR.parse::<u32>().unwrap_or(0),
        VERSION_PATCH.parse::<u32>().unwrap_or(0),
    )
}
