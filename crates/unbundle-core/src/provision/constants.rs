/// Directory under the data root that holds every extracted asset set
pub const ASSET_DIR: &str = "rasters";
/// Logical subdirectory shared by the archive and the output directory
pub const ENTRY_SUBDIR: &str = "NO2";
/// Application directory name under the platform data directory
pub const APP_DIR_NAME: &str = "unbundle";
/// Prefix for in-flight extraction files; never matches a manifest entry
pub const PARTIAL_PREFIX: &str = ".unbundle-";
/// Suffix for in-flight extraction files
pub const PARTIAL_SUFFIX: &str = ".partial";
/// Streaming buffer size for a single entry
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;
