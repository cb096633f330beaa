// Submission validation
// Rejections here are synchronous: no job is ever created for them.

use crate::domain::FetchRequest;
use crate::error::{AppError, Result};
use url::Url;

/// Maximum length of a caller-supplied output name
pub const MAX_CUSTOM_NAME_LEN: usize = 200;

/// Domain allowlist for source URLs
///
/// A host is accepted when it equals an allowed domain or is a subdomain of
/// one (`www.youtube.com`, `m.youtube.com`). An empty allowlist accepts any host.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    allowed_domains: Vec<String>,
}

impl UrlPolicy {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { allowed_domains }
    }

    fn host_allowed(&self, host: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Parse and check a source URL
    pub fn validate(&self, raw: &str) -> Result<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::Validation("URL is required".to_string()));
        }

        let url = Url::parse(raw)
            .map_err(|e| AppError::Validation(format!("Invalid URL {:?}: {}", raw, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AppError::Validation("URL has no host".to_string()))?;

        if !self.host_allowed(host) {
            return Err(AppError::Validation(format!(
                "Domain not allowed: {}",
                host
            )));
        }

        Ok(url)
    }
}

/// Validate a fully built request
pub fn validate_request(policy: &UrlPolicy, req: &FetchRequest) -> Result<()> {
    policy.validate(&req.url)?;

    if let Some(name) = &req.custom_name {
        if name.chars().count() > MAX_CUSTOM_NAME_LEN {
            return Err(AppError::Validation(format!(
                "Custom name too long (max {} characters)",
                MAX_CUSTOM_NAME_LEN
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(AppError::Validation(
                "Custom name contains control characters".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn youtube() -> UrlPolicy {
        UrlPolicy::new(["youtube.com", "youtu.be"])
    }

    #[test]
    fn test_accepts_allowlisted_hosts_and_subdomains() {
        let policy = youtube();
        assert!(policy.validate("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(policy.validate("https://youtu.be/abc").is_ok());
        assert!(policy.validate("  http://M.YouTube.com/watch?v=abc  ").is_ok());
    }

    #[test]
    fn test_rejects_lookalike_hosts() {
        let policy = youtube();
        assert!(policy.validate("https://notyoutube.com/watch?v=abc").is_err());
        assert!(policy.validate("https://youtube.com.evil.example/x").is_err());
        assert!(policy.validate("https://example.com/youtube.com").is_err());
    }

    #[test]
    fn test_rejects_malformed_input() {
        let policy = youtube();
        let err = policy.validate("").unwrap_err();
        assert!(err.to_string().contains("required"));

        assert!(policy.validate("not a url").is_err());
        assert!(policy.validate("ftp://youtube.com/file").is_err());
        assert!(policy.validate("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_empty_allowlist_accepts_any_host() {
        let policy = UrlPolicy::new(Vec::<String>::new());
        assert!(policy.validate("https://example.org/video").is_ok());
    }

    #[test]
    fn test_validate_request_custom_name() {
        let policy = youtube();
        let ok = FetchRequest::new("https://youtu.be/abc").with_custom_name("my clip");
        assert!(validate_request(&policy, &ok).is_ok());

        let long = FetchRequest::new("https://youtu.be/abc").with_custom_name("a".repeat(201));
        let err = validate_request(&policy, &long).unwrap_err();
        assert!(err.to_string().contains("too long"));

        let ctrl = FetchRequest::new("https://youtu.be/abc").with_custom_name("bad\nname");
        assert!(validate_request(&policy, &ctrl).is_err());
    }
}
