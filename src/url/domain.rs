use std::net::IpAddr;
use url::Url;

/// Second-level labels that act as public suffixes under a country code,
/// e.g. `co.uk` or `com.au`. A registrable domain under these keeps three labels.
const COMPOUND_SUFFIXES: &[&str] = &[
    "ac", "co", "com", "edu", "gov", "govt", "net", "org", "ltd", "plc", "nic", "mil", "nom",
    "sch", "ne", "or", "go", "gob", "gouv",
];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use domain_reach::url::extract_host;
///
/// let url = Url::parse("https://API.Example.com:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("api.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_end_matches('.').to_lowercase())
}

/// Reduces a host to its registrable domain
///
/// `api.v2.example.com` becomes `example.com`, `shop.example.co.uk` becomes
/// `example.co.uk`. IP addresses and single-label hosts are returned unchanged.
///
/// # Examples
///
/// ```
/// use domain_reach::url::registrable_domain;
///
/// assert_eq!(registrable_domain("blog.example.com"), "example.com");
/// assert_eq!(registrable_domain("www.bbc.co.uk"), "bbc.co.uk");
/// assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && COMPOUND_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len() - keep..].join(".")
}

/// Registrable domain of a URL's host, if it has one
pub fn url_registrable_domain(url: &Url) -> Option<String> {
    extract_host(url).map(|host| registrable_domain(&host))
}
