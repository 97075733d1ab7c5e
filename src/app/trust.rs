//! URL normalization and the static domain trust tables.

use url::Url;

const TRUSTED_DOMAINS: [&str; 12] = [
    "amazon.in",
    "amazon.com",
    "amazon.co.uk",
    "amazon.de",
    "amazon.ca",
    "amazon.ae",
    "amazon.com.au",
    "amazon.it",
    "amazon.es",
    "amazon.fr",
    "flipkart.com",
    "itunes.apple.com",
];

// amzn.in is deliberately absent; add it at startup with --shortener.
const URL_SHORTENERS: [&str; 9] = [
    "amzn.to",
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "cutt.ly",
    "shorturl.at",
];

const SUSPICIOUS_WORDS: [&str; 9] = [
    "replica",
    "firstcopy",
    "first-copy",
    "copy",
    "counterfeit",
    "fake",
    "mirror",
    "clone",
    "grade a",
];

/// Read-only lookup tables shared by every scoring job.
///
/// Built once at startup and handed out behind an `Arc`; nothing mutates it
/// afterwards, so concurrent jobs read it without locking.
#[derive(Debug, Clone)]
pub struct TrustTables {
    trusted: Vec<String>,
    shorteners: Vec<String>,
    suspicious: Vec<String>,
}

impl Default for TrustTables {
    fn default() -> Self {
        Self {
            trusted: TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            shorteners: URL_SHORTENERS.iter().map(|d| d.to_string()).collect(),
            suspicious: SUSPICIOUS_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl TrustTables {
    /// Built-in tables plus extra shortener domains supplied at startup.
    /// Entries may be bare hosts or full URLs; only the host is kept.
    pub fn with_extra_shorteners<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables = Self::default();
        for domain in extra {
            let domain = shortener_host(domain.as_ref());
            if !domain.is_empty() && !tables.shorteners.contains(&domain) {
                tables.shorteners.push(domain);
            }
        }
        tables
    }

    /// Exact match, or a dot-bounded subdomain of a trusted entry.
    pub fn is_trusted(&self, domain: &str) -> bool {
        if domain.is_empty() {
            return false;
        }
        self.trusted.iter().any(|trusted| {
            domain == trusted
                || domain
                    .strip_suffix(trusted.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn is_shortener(&self, domain: &str) -> bool {
        self.shorteners.iter().any(|s| s == domain)
    }

    /// Suspicious words found in `url`, compared case-insensitively.
    pub fn suspicious_words_in(&self, url: &str) -> Vec<&str> {
        let lower = url.to_lowercase();
        self.suspicious
            .iter()
            .filter(|word| lower.contains(word.as_str()))
            .map(|word| word.as_str())
            .collect()
    }

    pub fn trusted_domains(&self) -> &[String] {
        &self.trusted
    }
}

/// Parsed views of a scanned URL. `domain` is empty when the input does not
/// parse; callers treat that as untrusted and unidentifiable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub domain: String,
    pub path: String,
    pub query_pairs: Vec<(String, String)>,
}

impl UrlParts {
    pub fn parse(raw: &str) -> Self {
        let Ok(url) = Url::parse(raw.trim()) else {
            return Self::default();
        };

        Self {
            scheme: url.scheme().to_ascii_lowercase(),
            domain: url.host_str().map(normalize_host).unwrap_or_default(),
            path: url.path().to_string(),
            query_pairs: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// First non-empty value for `key`, matched case-insensitively.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query_pairs
            .iter()
            .find(|(k, v)| k.eq_ignore_ascii_case(key) && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}

pub fn domain_of(raw: &str) -> String {
    UrlParts::parse(raw).domain
}

fn shortener_host(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        return domain_of(raw);
    }
    let host = raw.split(['/', '?', '#']).next().unwrap_or_default();
    normalize_host(host)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_lowercased_and_www_stripped() {
        assert_eq!(domain_of("https://WWW.Amazon.IN/dp/B0D12345IP"), "amazon.in");
        assert_eq!(domain_of("http://m.flipkart.com/p/itm123"), "m.flipkart.com");
    }

    #[test]
    fn unparseable_input_yields_empty_domain() {
        assert_eq!(domain_of("not a url"), "");
        assert_eq!(domain_of("https://"), "");
        assert_eq!(UrlParts::parse(""), UrlParts::default());
    }

    #[test]
    fn port_and_userinfo_are_not_part_of_the_domain() {
        assert_eq!(domain_of("https://amazon.in@evil.example:8443/x"), "evil.example");
        assert_eq!(domain_of("https://www.amazon.in:443/dp/B0D12345IP"), "amazon.in");
    }

    #[test]
    fn every_trusted_domain_and_its_subdomains_are_trusted() {
        let tables = TrustTables::default();
        for domain in tables.trusted_domains() {
            assert!(tables.is_trusted(domain), "{domain}");
            assert!(tables.is_trusted(&format!("sub.{domain}")), "sub.{domain}");
            assert!(!tables.is_trusted(&format!("evil{domain}")), "evil{domain}");
        }
    }

    #[test]
    fn lookalike_and_empty_domains_are_untrusted() {
        let tables = TrustTables::default();
        assert!(!tables.is_trusted(""));
        assert!(!tables.is_trusted("amazon.in.evil.com"));
        assert!(!tables.is_trusted("aptronixindia.com"));
        assert!(!tables.is_trusted("amzn.in"));
    }

    #[test]
    fn shortener_lookup_is_exact() {
        let tables = TrustTables::default();
        assert!(tables.is_shortener("bit.ly"));
        assert!(!tables.is_shortener("x.bit.ly"));
        assert!(!tables.is_shortener("amzn.in"));

        let extended = TrustTables::with_extra_shorteners(["WWW.AMZN.IN", "bit.ly", " "]);
        assert!(extended.is_shortener("amzn.in"));
        assert_eq!(
            extended.shorteners.iter().filter(|s| *s == "bit.ly").count(),
            1
        );
    }

    #[test]
    fn extra_shorteners_given_as_urls_keep_only_the_host() {
        let extended = TrustTables::with_extra_shorteners([
            "https://amzn.in",
            "http://www.a.co/d/xyz",
            "sho.rt/path?q=1",
            "https://",
        ]);
        assert!(extended.is_shortener("amzn.in"));
        assert!(extended.is_shortener("a.co"));
        assert!(extended.is_shortener("sho.rt"));
        assert!(!extended.shorteners.iter().any(|s| s.contains('/') || s.is_empty()));
    }

    #[test]
    fn suspicious_words_match_case_insensitively() {
        let tables = TrustTables::default();
        let hits = tables.suspicious_words_in("https://shop.example/FirstCopy-Watch");
        assert!(hits.contains(&"firstcopy"));
        assert!(hits.contains(&"copy"));
        assert!(tables.suspicious_words_in("https://shop.example/Grade A bags").contains(&"grade a"));
        assert!(tables.suspicious_words_in("https://amazon.in/dp/B0D12345IP").is_empty());
    }

    #[test]
    fn query_value_skips_empty_values_and_ignores_key_case() {
        let parts = UrlParts::parse("https://x.example/p?pid=&PID=ABC&asin=b0d12345ip");
        assert_eq!(parts.query_value("pid"), Some("ABC"));
        assert_eq!(parts.query_value("ASIN"), Some("b0d12345ip"));
        assert_eq!(parts.query_value("missing"), None);
    }
}
