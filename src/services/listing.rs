use super::PipelineError;
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// One object currently stored at the destination, extracted from the
/// multi-status directory listing.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub href: String,
    pub last_modified: DateTime<Utc>,
    pub is_collection: bool,
}

/// Generic parsed XML element. The listing document is deliberately kept
/// as a loose tree instead of a fixed schema: element names in the wild
/// appear under different namespace prefixes (or none), so every field is
/// located by local-name matching rather than by path.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Element name with any namespace prefix stripped.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn matches(&self, local: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(local)
    }

    /// First descendant (depth-first) whose local name matches `local`,
    /// case-insensitively, ignoring any namespace prefix. This is the one
    /// lookup every field extractor goes through.
    pub fn find_first(&self, local: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.matches(local) {
                return Some(child);
            }
            if let Some(found) = child.find_first(local) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants (depth-first) whose local name matches `local`.
    pub fn find_all<'a>(&'a self, local: &str) -> Vec<&'a XmlNode> {
        let mut out = Vec::new();
        self.collect_all(local, &mut out);
        out
    }

    fn collect_all<'a>(&'a self, local: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.matches(local) {
                out.push(child);
            }
            child.collect_all(local, out);
        }
    }
}

/// Parse an XML document into a generic tree. The returned node is a
/// synthetic root wrapping the document's top-level elements.
pub fn parse_tree(xml: &str) -> Result<XmlNode, PipelineError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut stack: Vec<XmlNode> = vec![XmlNode::default()];
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                });
            }
            Ok(Event::Empty(e)) => {
                let node = XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(e.as_ref()).into_owned());
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop();
                match (node, stack.last_mut()) {
                    (Some(node), Some(parent)) => parent.children.push(node),
                    _ => {
                        return Err(PipelineError::Listing(
                            "malformed listing document: unbalanced elements".to_string(),
                        ));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PipelineError::Listing(format!(
                    "malformed listing document: {e}"
                )));
            }
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(PipelineError::Listing(
            "malformed listing document: unclosed elements".to_string(),
        ));
    }
    Ok(stack.remove(0))
}

/// A property status line in the 2xx range, e.g. "HTTP/1.1 200 OK".
fn status_is_success(line: &str) -> bool {
    line.split_whitespace()
        .filter_map(|token| token.parse::<u16>().ok())
        .any(|code| (200..300).contains(&code))
}

/// Path portion of an href, which may be a bare path or a full URL.
fn href_path(href: &str) -> &str {
    match href.find("://") {
        Some(scheme_end) => match href[scheme_end + 3..].find('/') {
            Some(slash) => &href[scheme_end + 3 + slash..],
            None => "",
        },
        None => href,
    }
}

/// Final non-empty path segment of the href, URL-decoded. `None` for the
/// listing root itself.
fn name_from_href(href: &str) -> Option<String> {
    let trimmed = href_path(href).trim_end_matches('/');
    let segment = trimmed.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    if decoded.is_empty() { None } else { Some(decoded) }
}

/// Destination listing timestamps are RFC 2822 in practice but some
/// backends emit RFC 3339; anything unparseable falls back to the epoch
/// so the entry ranks oldest and retention stays bounded.
fn parse_dav_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Look up `field` across the response's *successful* propstat blocks
/// only; properties under a non-2xx status are untrusted.
fn trusted_prop<'a>(propstats: &[&'a XmlNode], field: &str) -> Option<&'a XmlNode> {
    propstats.iter().find_map(|ps| ps.find_first(field))
}

/// Parse a multi-status listing document into structured entries.
///
/// Tolerates arbitrary (or absent) namespace prefixes on every element,
/// drops responses with no successful property block, drops the listing
/// root itself, and keeps only names matching the artifact `suffix`.
pub fn parse_listing(
    xml: &str,
    root_href: &str,
    suffix: &str,
) -> Result<Vec<RemoteEntry>, PipelineError> {
    let tree = parse_tree(xml)?;
    let multistatus = tree.find_first("multistatus").ok_or_else(|| {
        PipelineError::Listing("no multistatus element in listing document".to_string())
    })?;

    let root_path = href_path(root_href).trim_end_matches('/');
    let mut entries = Vec::new();

    for response in multistatus.find_all("response") {
        let Some(href_node) = response.find_first("href") else {
            tracing::debug!("listing response without href, skipping");
            continue;
        };
        let href = href_node.text.trim().to_string();

        let successful: Vec<&XmlNode> = response
            .find_all("propstat")
            .into_iter()
            .filter(|ps| {
                ps.find_first("status")
                    .map(|s| status_is_success(&s.text))
                    .unwrap_or(false)
            })
            .collect();
        if successful.is_empty() {
            tracing::debug!("no successful propstat for {}, skipping", href);
            continue;
        }

        // The root of the listing describes the directory itself, never a
        // retention candidate.
        if href_path(&href).trim_end_matches('/') == root_path {
            continue;
        }
        let Some(name) = name_from_href(&href) else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }

        let last_modified = trusted_prop(&successful, "getlastmodified")
            .and_then(|n| parse_dav_timestamp(&n.text))
            .unwrap_or_else(|| {
                tracing::debug!("no usable timestamp for {}, treating as oldest", name);
                DateTime::<Utc>::UNIX_EPOCH
            });

        let is_collection = trusted_prop(&successful, "resourcetype")
            .map(|rt| rt.find_first("collection").is_some())
            .unwrap_or(false);

        entries.push(RemoteEntry {
            name,
            href,
            last_modified,
            is_collection,
        });
    }

    Ok(entries)
}
