pub mod steamcmd;

pub use steamcmd::{parse_license_dump, read_license_dump, LicenseRecord, SteamCmd};
