use url::Url;

/// Parse a service target into a probe-able URL.
///
/// The error string is what gets recorded as the probe's failure message.
pub fn parse_probe_url(target: &str) -> Result<Url, String> {
    let target = target.trim();
    if target.is_empty() {
        return Err("Target cannot be empty".to_string());
    }

    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(e) if !target.contains("://") => {
            return Err(format!("URL must include scheme (http:// or https://): {e}"));
        }
        Err(e) => return Err(format!("Invalid URL: {e}")),
    };

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(format!("Invalid scheme '{scheme}'. Must be http or https"));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err("URL must have a valid host".to_string());
    }

    Ok(url)
}
