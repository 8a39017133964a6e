//! Source resolvers for finding the latest version of an app
//!
//! This module provides:
//! - Directory listing resolver (regex scraping of Apache style listings)
//! - Mozilla CI index resolver (chain-of-trust JSON)
//! - GitHub releases resolver (latest release JSON)
//!
//! Each app's `Source` in the catalogue selects the resolver.

mod directory_listing;
mod github;
mod mozilla_ci;

pub use directory_listing::DirectoryListingResolver;
pub use github::GithubReleaseResolver;
pub use mozilla_ci::MozillaCiResolver;

use crate::domain::{Abi, App, DeviceEnvironment, LatestVersion, Source};
use crate::error::{FetchError, ResolveError};
use crate::fetch::{CacheMode, Fetcher};
use async_trait::async_trait;

/// Trait for latest version resolvers
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Short name of the remote source, for logs and output
    fn source_name(&self) -> &'static str;

    /// Resolve the latest version of `app` for `device`
    async fn fetch_latest_update(
        &self,
        fetcher: &dyn Fetcher,
        app: App,
        device: &DeviceEnvironment,
        mode: CacheMode,
    ) -> Result<LatestVersion, ResolveError>;
}

/// Create the resolver for the given app
pub fn create_resolver(app: App) -> Box<dyn SourceResolver> {
    match app.info().source {
        Source::DirectoryListing {
            base_url,
            file_prefix,
        } => Box::new(DirectoryListingResolver::new(base_url, file_prefix)),
        Source::MozillaCi {
            index_url,
            artifacts,
        } => Box::new(MozillaCiResolver::new(index_url, artifacts)),
        Source::GithubRelease {
            repository,
            assets,
            tag_prefix,
        } => Box::new(GithubReleaseResolver::new(repository, assets, tag_prefix)),
    }
}

/// Pick the device ABI the app is built for
pub(crate) fn select_abi(app: App, device: &DeviceEnvironment) -> Result<Abi, ResolveError> {
    device
        .best_abi(app.info().supported_abis)
        .ok_or_else(|| ResolveError::UnsupportedAbi {
            app: app.id().to_string(),
            abis: device.abi_list(),
        })
}

/// Classify a fetch failure of `app`
///
/// A body that does not parse is missing data, everything else is network.
pub(crate) fn fetch_failed(app: App, error: FetchError) -> ResolveError {
    match error {
        FetchError::InvalidBody { url, message } => {
            ResolveError::missing_data(app.id(), format!("{}: {}", url, message))
        }
        other => ResolveError::network(app.id(), other),
    }
}

/// Look up the per-ABI entry of a table
pub(crate) fn lookup_abi<'a>(
    app: App,
    abi: Abi,
    table: &'a [(Abi, &'static str)],
) -> Result<&'a str, ResolveError> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == abi)
        .map(|(_, value)| *value)
        .ok_or_else(|| ResolveError::UnsupportedAbi {
            app: app.id().to_string(),
            abis: abi.to_string(),
        })
}
