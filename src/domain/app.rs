//! Catalogue of supported apps
//!
//! Every app is static data: identity, device requirements, how its
//! versions compare and which remote source publishes it. Adding an app
//! means adding a variant and its `AppInfo`.

use super::Abi;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// API level of Android 5.0 (Lollipop)
const LOLLIPOP: u32 = 21;

/// Apps whose updates can be checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum App {
    TorBrowser,
    FirefoxKlar,
    FirefoxFocus,
    Iceraven,
    Kiwi,
}

/// How two version strings of an app are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionScheme {
    /// Dotted numeric versions like `12.5.1`
    Dotted,
    /// Build timestamps in RFC 3339 format
    Timestamp,
}

/// Where the latest version of an app is published
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Apache style directory listing with one directory per version
    DirectoryListing {
        base_url: &'static str,
        file_prefix: &'static str,
    },
    /// Mozilla CI task index with a chain-of-trust document
    MozillaCi {
        index_url: &'static str,
        artifacts: &'static [(Abi, &'static str)],
    },
    /// Latest GitHub release, asset picked by a per-ABI name pattern
    GithubRelease {
        repository: &'static str,
        assets: &'static [(Abi, &'static str)],
        tag_prefix: &'static str,
    },
}

/// Static description of an app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppInfo {
    pub package_name: &'static str,
    pub title: &'static str,
    pub download_source: &'static str,
    pub project_page: &'static str,
    pub supported_abis: &'static [Abi],
    pub min_api_level: u32,
    /// SHA-256 of the signing certificate
    pub signature_hash: &'static str,
    pub version_scheme: VersionScheme,
    pub source: Source,
    /// Name of the package inside the downloaded zip, if the app is zipped
    pub file_name_in_zip_archive: Option<&'static str>,
}

const ALL_ABIS: &[Abi] = &[Abi::Arm64V8a, Abi::ArmeabiV7a, Abi::X86_64, Abi::X86];
const ARM_ABIS: &[Abi] = &[Abi::Arm64V8a, Abi::ArmeabiV7a];

static TOR_BROWSER: AppInfo = AppInfo {
    package_name: "org.torproject.torbrowser",
    title: "Tor Browser",
    download_source: "https://dist.torproject.org/torbrowser",
    project_page: "https://www.torproject.org/download/#android",
    supported_abis: ALL_ABIS,
    min_api_level: LOLLIPOP,
    signature_hash: "20061f045e737c67375c17794cfedb436a03cec6bacb7cb9f96642205ca2cec8",
    version_scheme: VersionScheme::Dotted,
    source: Source::DirectoryListing {
        base_url: "https://dist.torproject.org/torbrowser",
        file_prefix: "tor-browser-android",
    },
    file_name_in_zip_archive: None,
};

static FIREFOX_KLAR: AppInfo = AppInfo {
    package_name: "org.mozilla.klar",
    title: "Firefox Klar",
    download_source: "Mozilla CI",
    project_page: "https://github.com/mozilla-mobile/focus-android",
    supported_abis: ARM_ABIS,
    min_api_level: LOLLIPOP,
    signature_hash: "6203a473be36d64ee37f87fa500edbc79eab930610ab9b9fa4ca7d5c1f1b4ffc",
    version_scheme: VersionScheme::Timestamp,
    source: Source::MozillaCi {
        index_url: "https://firefox-ci-tc.services.mozilla.com/api/index/v1/task/project.mobile.focus.release.latest",
        artifacts: &[
            (Abi::ArmeabiV7a, "app-klar-arm-release-unsigned.apk"),
            (Abi::Arm64V8a, "app-klar-aarch64-release-unsigned.apk"),
        ],
    },
    file_name_in_zip_archive: None,
};

static FIREFOX_FOCUS: AppInfo = AppInfo {
    package_name: "org.mozilla.focus",
    title: "Firefox Focus",
    download_source: "Mozilla CI",
    project_page: "https://github.com/mozilla-mobile/focus-android",
    supported_abis: ARM_ABIS,
    min_api_level: LOLLIPOP,
    signature_hash: "6203a473be36d64ee37f87fa500edbc79eab930610ab9b9fa4ca7d5c1f1b4ffc",
    version_scheme: VersionScheme::Timestamp,
    source: Source::MozillaCi {
        index_url: "https://firefox-ci-tc.services.mozilla.com/api/index/v1/task/project.mobile.focus.release.latest",
        artifacts: &[
            (Abi::ArmeabiV7a, "app-focus-arm-release-unsigned.apk"),
            (Abi::Arm64V8a, "app-focus-aarch64-release-unsigned.apk"),
        ],
    },
    file_name_in_zip_archive: None,
};

static ICERAVEN: AppInfo = AppInfo {
    package_name: "io.github.forkmaintainers.iceraven",
    title: "Iceraven",
    download_source: "GitHub",
    project_page: "https://github.com/fork-maintainers/iceraven-browser",
    supported_abis: ALL_ABIS,
    min_api_level: LOLLIPOP,
    signature_hash: "9c0d22379f487b70a4f9f8bec0173cf91a1644f08f93385b5b782ce37660ba81",
    version_scheme: VersionScheme::Dotted,
    source: Source::GithubRelease {
        repository: "fork-maintainers/iceraven-browser",
        assets: &[
            (Abi::Arm64V8a, r"^iceraven-.*browser-arm64-v8a-forkRelease\.apk$"),
            (Abi::ArmeabiV7a, r"^iceraven-.*browser-armeabi-v7a-forkRelease\.apk$"),
            (Abi::X86_64, r"^iceraven-.*browser-x86_64-forkRelease\.apk$"),
            (Abi::X86, r"^iceraven-.*browser-x86-forkRelease\.apk$"),
        ],
        tag_prefix: "iceraven-",
    },
    file_name_in_zip_archive: None,
};

static KIWI: AppInfo = AppInfo {
    package_name: "com.kiwibrowser.browser",
    title: "Kiwi Browser",
    download_source: "GitHub",
    project_page: "https://github.com/kiwibrowser/src.next",
    supported_abis: ALL_ABIS,
    min_api_level: 23,
    signature_hash: "829b930e919cd56c9a67617c312e3b425a38894b929e735c3d391d9c51b9e4c0",
    version_scheme: VersionScheme::Dotted,
    source: Source::GithubRelease {
        repository: "kiwibrowser/src.next",
        assets: &[
            (Abi::Arm64V8a, r"^com\.kiwibrowser\.browser-arm64-\d+-github\.zip$"),
            (Abi::ArmeabiV7a, r"^com\.kiwibrowser\.browser-arm-\d+-github\.zip$"),
            (Abi::X86_64, r"^com\.kiwibrowser\.browser-x64-\d+-github\.zip$"),
            (Abi::X86, r"^com\.kiwibrowser\.browser-x86-\d+-github\.zip$"),
        ],
        tag_prefix: "",
    },
    file_name_in_zip_archive: Some("ChromePublic.apk"),
};

impl App {
    /// Returns the static description of this app
    pub fn info(&self) -> &'static AppInfo {
        match self {
            App::TorBrowser => &TOR_BROWSER,
            App::FirefoxKlar => &FIREFOX_KLAR,
            App::FirefoxFocus => &FIREFOX_FOCUS,
            App::Iceraven => &ICERAVEN,
            App::Kiwi => &KIWI,
        }
    }

    /// Stable identifier used in settings and output (e.g. `TOR_BROWSER`)
    pub fn id(&self) -> &'static str {
        match self {
            App::TorBrowser => "TOR_BROWSER",
            App::FirefoxKlar => "FIREFOX_KLAR",
            App::FirefoxFocus => "FIREFOX_FOCUS",
            App::Iceraven => "ICERAVEN",
            App::Kiwi => "KIWI",
        }
    }

    pub fn package_name(&self) -> &'static str {
        self.info().package_name
    }

    pub fn is_published_as_zip(&self) -> bool {
        self.info().file_name_in_zip_archive.is_some()
    }

    /// Returns all supported apps
    pub fn all() -> &'static [App] {
        &[
            App::TorBrowser,
            App::FirefoxKlar,
            App::FirefoxFocus,
            App::Iceraven,
            App::Kiwi,
        ]
    }

    /// Find an app by its package name
    pub fn from_package_name(package_name: &str) -> Option<App> {
        App::all()
            .iter()
            .copied()
            .find(|app| app.package_name() == package_name)
    }

    /// Reduce the raw version reported by the system to the comparable part
    ///
    /// Tor Browser reports e.g. `102.2.1-Release (11.5.2)`, the Tor Browser
    /// version is the trailing parenthesised token.
    pub fn normalize_installed_version(&self, raw: &str) -> String {
        match self {
            App::TorBrowser => raw
                .split(' ')
                .next_back()
                .unwrap_or(raw)
                .trim_start_matches('(')
                .trim_end_matches(')')
                .to_string(),
            _ => raw.trim().to_string(),
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info().title)
    }
}

impl FromStr for App {
    type Err = ConfigError;

    /// Accepts the identifier (`TOR_BROWSER`, `tor-browser`) or the package name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        App::all()
            .iter()
            .copied()
            .find(|app| app.id().eq_ignore_ascii_case(&wanted) || app.package_name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownApp {
                value: s.to_string(),
            })
    }
}
