/// Build a SOAP 1.1 envelope invoking `action` on the service `namespace`.
/// `params` is inserted verbatim as the action element's children.
pub fn envelope(namespace: &str, action: &str, params: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:{action} xmlns:u="{namespace}">{params}</u:{action}>
  </s:Body>
</s:Envelope>"#
    )
}

/// Value of the `SOAPAction` header. The router answers 404 without it.
pub fn soap_action(namespace: &str, action: &str) -> String {
    format!("{namespace}#{action}")
}

/// Text between the first `<tag>` and the following `</tag>`.
pub fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(&xml[start..start + len])
}
