use std::collections::BTreeSet;
use std::time::Duration;
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Attempt a TCP connect to every port at once. Refused, timed-out and
/// unresolvable targets all count as closed.
pub async fn scan_ports(host: &str, ports: &[u16], connect_timeout: Duration) -> BTreeSet<u16> {
    let attempts = ports.iter().map(|&port| async move {
        match timeout(connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Some(port),
            _ => None,
        }
    });

    join_all(attempts).await.into_iter().flatten().collect()
}

/// GET `url` and return the trimmed text of its `<title>` element.
pub async fn fetch_title(http: &reqwest::Client, url: &str) -> Option<String> {
    let response = http.get(url).send().await.ok()?;
    let bytes = response.bytes().await.ok()?;
    let html = String::from_utf8_lossy(&bytes);
    extract_title(&html)
}

pub fn extract_title(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets valid for slicing the original
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_len = lower[content_start..].find("</title")?;

    let title = html[content_start..content_start + content_len]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}
