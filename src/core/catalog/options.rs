use crate::archiver::BundleBuildResult;
use crate::group::LoadOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Load options the runtime applies when fetching a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BundleRequestOptions {
    /// CRC to verify, 0 when disabled
    pub crc: u32,

    /// Cache version hash, empty when caching is disabled
    pub hash: String,

    pub use_crc_for_cached_bundle: bool,
    pub chunked_transfer: bool,
    pub redirect_limit: i32,
    pub retry_count: u32,
    pub timeout: u32,

    /// File stem of the bundle as written by the archiver
    pub bundle_name: String,

    pub bundle_size: u64,
    pub clear_other_cached_versions: bool,
}

impl BundleRequestOptions {
    /// Combine a group's load options with what the archiver reported
    pub fn from_build(options: &LoadOptions, result: &BundleBuildResult) -> Self {
        let bundle_name = Path::new(&result.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        BundleRequestOptions {
            crc: if options.use_crc { result.crc } else { 0 },
            hash: if options.use_cache {
                result.hash.clone()
            } else {
                String::new()
            },
            use_crc_for_cached_bundle: options.use_crc_for_cached_bundles,
            chunked_transfer: options.chunked_transfer,
            redirect_limit: options.redirect_limit,
            retry_count: options.retry_count,
            timeout: options.timeout,
            bundle_name,
            bundle_size: result.file_size,
            clear_other_cached_versions: options.clear_other_cached_versions,
        }
    }
}
