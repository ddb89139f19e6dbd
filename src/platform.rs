use once_cell::sync::Lazy;

/// Per-hostname scanning rules. Matching is exact except for the one
/// suffix-wildcard rule covering Zoom's per-tenant subdomains.
#[derive(Debug)]
struct PlatformRule {
    host: HostMatch,
    post_selector: Option<&'static str>,
    video_selector: Option<&'static str>,
    meeting: bool,
}

#[derive(Debug)]
enum HostMatch {
    Exact(&'static str),
    Suffix(&'static str),
}

impl HostMatch {
    fn matches(&self, hostname: &str) -> bool {
        match self {
            HostMatch::Exact(host) => hostname.eq_ignore_ascii_case(host),
            HostMatch::Suffix(domain) => {
                let hostname = hostname.to_ascii_lowercase();
                hostname == *domain || hostname.ends_with(&format!(".{domain}"))
            }
        }
    }
}

static PLATFORMS: Lazy<Vec<PlatformRule>> = Lazy::new(|| {
    vec![
        PlatformRule {
            host: HostMatch::Exact("www.facebook.com"),
            post_selector: Some("div[data-ad-preview='message']"),
            video_selector: Some("video"),
            meeting: false,
        },
        PlatformRule {
            host: HostMatch::Exact("x.com"),
            post_selector: Some("div[data-testid='tweetText']"),
            video_selector: Some("video"),
            meeting: false,
        },
        PlatformRule {
            host: HostMatch::Exact("twitter.com"),
            post_selector: Some("div[data-testid='tweetText']"),
            video_selector: Some("video"),
            meeting: false,
        },
        PlatformRule {
            host: HostMatch::Exact("www.reddit.com"),
            post_selector: Some("div[data-post-click-location='text-body']"),
            video_selector: Some("video"),
            meeting: false,
        },
        PlatformRule {
            host: HostMatch::Exact("www.youtube.com"),
            post_selector: Some("yt-attributed-string#content-text"),
            video_selector: Some("video.html5-main-video"),
            meeting: false,
        },
        PlatformRule {
            host: HostMatch::Suffix("zoom.us"),
            post_selector: None,
            video_selector: Some("video"),
            meeting: true,
        },
        PlatformRule {
            host: HostMatch::Exact("meet.google.com"),
            post_selector: None,
            video_selector: Some("video"),
            meeting: true,
        },
        PlatformRule {
            host: HostMatch::Exact("teams.microsoft.com"),
            post_selector: None,
            video_selector: Some("video"),
            meeting: true,
        },
        PlatformRule {
            host: HostMatch::Exact("teams.live.com"),
            post_selector: None,
            video_selector: Some("video"),
            meeting: true,
        },
    ]
});

fn rule_for(hostname: &str) -> Option<&'static PlatformRule> {
    PLATFORMS.iter().find(|rule| rule.host.matches(hostname))
}

pub fn post_selector(hostname: &str) -> Option<&'static str> {
    rule_for(hostname).and_then(|rule| rule.post_selector)
}

pub fn video_selector(hostname: &str) -> Option<&'static str> {
    rule_for(hostname).and_then(|rule| rule.video_selector)
}

pub fn is_meeting_hostname(hostname: &str) -> bool {
    rule_for(hostname).map_or(false, |rule| rule.meeting)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_subdomains_use_the_generic_video_selector() {
        assert_eq!(video_selector("us05web.zoom.us"), Some("video"));
        assert!(is_meeting_hostname("us05web.zoom.us"));
        assert!(is_meeting_hostname("zoom.us"));
        assert_eq!(post_selector("us05web.zoom.us"), None);
    }

    #[test]
    fn unsupported_hostnames_resolve_to_nothing() {
        assert_eq!(post_selector("example.com"), None);
        assert_eq!(video_selector("example.com"), None);
        assert!(!is_meeting_hostname("example.com"));
    }

    #[test]
    fn suffix_rule_does_not_match_lookalike_domains() {
        assert!(!is_meeting_hostname("notzoom.us"));
        assert!(!is_meeting_hostname("zoom.us.evil.example"));
    }

    #[test]
    fn social_platforms_expose_post_selectors() {
        assert!(post_selector("www.facebook.com").is_some());
        assert_eq!(post_selector("x.com"), post_selector("twitter.com"));
        assert!(!is_meeting_hostname("www.facebook.com"));
    }
}
