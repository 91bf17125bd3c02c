//! Platform allowlist and admission content policy
//!
//! URLs are admitted only when their host belongs to a known media platform
//! and is not on the configured blocklist. Matching is done on the parsed host
//! so that `www.`/`m.` prefixes and other subdomains match their platform,
//! while look-alike hosts (`notyoutube.com`) do not.

use crate::config::ContentPolicyConfig;
use crate::error::Rejection;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Media platform a URL was matched to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// youtube.com, youtu.be
    Youtube,
    /// tiktok.com
    Tiktok,
    /// instagram.com
    Instagram,
    /// facebook.com, fb.watch
    Facebook,
    /// twitter.com, x.com
    Twitter,
    /// reddit.com, redd.it
    Reddit,
    /// twitch.tv
    Twitch,
    /// vimeo.com
    Vimeo,
    /// dailymotion.com
    Dailymotion,
    /// imgur.com
    Imgur,
    /// deviantart.com
    Deviantart,
    /// pinterest.com, pin.it
    Pinterest,
    /// flickr.com
    Flickr,
    /// 500px.com
    FiveHundredPx,
    /// unsplash.com
    Unsplash,
    /// pexels.com
    Pexels,
}

const PLATFORM_DOMAINS: &[(Platform, &[&str])] = &[
    (Platform::Youtube, &["youtube.com", "youtu.be"]),
    (Platform::Tiktok, &["tiktok.com"]),
    (Platform::Instagram, &["instagram.com"]),
    (Platform::Facebook, &["facebook.com", "fb.watch"]),
    (Platform::Twitter, &["twitter.com", "x.com"]),
    (Platform::Reddit, &["reddit.com", "redd.it"]),
    (Platform::Twitch, &["twitch.tv"]),
    (Platform::Vimeo, &["vimeo.com"]),
    (Platform::Dailymotion, &["dailymotion.com"]),
    (Platform::Imgur, &["imgur.com"]),
    (Platform::Deviantart, &["deviantart.com"]),
    (Platform::Pinterest, &["pinterest.com", "pin.it"]),
    (Platform::Flickr, &["flickr.com"]),
    (Platform::FiveHundredPx, &["500px.com"]),
    (Platform::Unsplash, &["unsplash.com"]),
    (Platform::Pexels, &["pexels.com"]),
];

impl Platform {
    /// Stable snake_case name, as stored in history
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Reddit => "reddit",
            Platform::Twitch => "twitch",
            Platform::Vimeo => "vimeo",
            Platform::Dailymotion => "dailymotion",
            Platform::Imgur => "imgur",
            Platform::Deviantart => "deviantart",
            Platform::Pinterest => "pinterest",
            Platform::Flickr => "flickr",
            Platform::FiveHundredPx => "five_hundred_px",
            Platform::Unsplash => "unsplash",
            Platform::Pexels => "pexels",
        }
    }

    /// Match a host name against the platform table
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        PLATFORM_DOMAINS
            .iter()
            .find(|(_, domains)| domains.iter().any(|d| host_matches(&host, d)))
            .map(|(platform, _)| *platform)
    }

    /// Platforms that only host still images
    ///
    /// These are fetched without a video format selector.
    pub fn is_image_only(&self) -> bool {
        matches!(
            self,
            Platform::Imgur
                | Platform::Deviantart
                | Platform::Pinterest
                | Platform::Flickr
                | Platform::FiveHundredPx
                | Platform::Unsplash
                | Platform::Pexels
        )
    }

    /// Every supported platform
    pub fn all() -> impl Iterator<Item = Platform> {
        PLATFORM_DOMAINS.iter().map(|(p, _)| *p)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Admission-time URL validation
#[derive(Clone, Debug)]
pub struct ContentPolicy {
    blocked_domains: Vec<String>,
}

impl ContentPolicy {
    /// Build a policy from configuration
    pub fn new(config: &ContentPolicyConfig) -> Self {
        Self {
            blocked_domains: config
                .blocked_domains
                .iter()
                .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    /// Validate a submitted URL, returning the platform it belongs to
    pub fn check(&self, raw: &str) -> Result<Platform, Rejection> {
        let url = Url::parse(raw.trim()).map_err(|e| Rejection::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| Rejection::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if let Some(domain) = self
            .blocked_domains
            .iter()
            .find(|d| host_matches(&host, d))
        {
            return Err(Rejection::BlockedDomain {
                domain: domain.clone(),
            });
        }

        Platform::from_host(&host).ok_or_else(|| Rejection::UnsupportedPlatform {
            url: raw.to_string(),
        })
    }
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self::new(&ContentPolicyConfig::default())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_platforms_match() {
        let policy = ContentPolicy::default();
        let cases = [
            ("https://www.youtube.com/watch?v=abc", Platform::Youtube),
            ("https://youtu.be/abc", Platform::Youtube),
            ("https://m.youtube.com/shorts/abc", Platform::Youtube),
            ("https://x.com/user/status/1", Platform::Twitter),
            ("https://twitter.com/user/status/1", Platform::Twitter),
            ("https://www.tiktok.com/@u/video/1", Platform::Tiktok),
            ("https://old.reddit.com/r/videos/1", Platform::Reddit),
            ("https://500px.com/photo/1", Platform::FiveHundredPx),
            ("HTTPS://WWW.VIMEO.COM/123", Platform::Vimeo),
        ];
        for (url, expected) in cases {
            assert_eq!(policy.check(url).unwrap(), expected, "{url}");
        }
    }

    #[test]
    fn test_lookalike_hosts_are_unsupported() {
        let policy = ContentPolicy::default();
        for url in [
            "https://notyoutube.com/watch",
            "https://youtube.com.evil.example/watch",
            "https://example.com/youtube.com",
        ] {
            assert!(
                matches!(
                    policy.check(url),
                    Err(Rejection::UnsupportedPlatform { .. })
                ),
                "{url}"
            );
        }
    }

    #[test]
    fn test_blocked_domains_win_over_platforms() {
        let policy = ContentPolicy::new(&ContentPolicyConfig {
            blocked_domains: vec!["www.vimeo.com".to_string(), "pornhub.com".to_string()],
        });
        assert!(matches!(
            policy.check("https://player.vimeo.com/video/1"),
            Err(Rejection::BlockedDomain { domain }) if domain == "vimeo.com"
        ));
        assert!(matches!(
            policy.check("https://de.pornhub.com/view"),
            Err(Rejection::BlockedDomain { .. })
        ));
    }

    #[test]
    fn test_invalid_urls() {
        let policy = ContentPolicy::default();
        for url in ["", "not a url", "ftp://youtube.com/file", "file:///etc/passwd"] {
            let err = policy.check(url).unwrap_err();
            assert!(matches!(err, Rejection::InvalidUrl { .. }), "{url}: {err}");
            assert!(err.is_validation());
        }
    }

    #[test]
    fn test_image_only_platforms() {
        let images: Vec<_> = Platform::all().filter(Platform::is_image_only).collect();
        assert_eq!(images.len(), 7);
        assert!(Platform::Unsplash.is_image_only());
        assert!(Platform::FiveHundredPx.is_image_only());
        // these host both clips and pictures
        for p in [Platform::Instagram, Platform::Facebook, Platform::Twitter, Platform::Reddit] {
            assert!(!p.is_image_only(), "{p} hosts video too");
        }
        assert!(!Platform::Youtube.is_image_only());
    }

    #[test]
    fn test_all_platforms_have_domains() {
        assert_eq!(Platform::all().count(), 16);
        for platform in Platform::all() {
            assert!(!platform.as_str().is_empty());
        }
    }
}
