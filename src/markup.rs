//! Minimal Tag Scanner for BOX Components
//!
//! Finds component sections (`<style>`, `<template>`, `<script>`) and opening
//! tags with their attributes. Only the subset of HTML that component files
//! actually use is understood: quoted and unquoted attribute values, boolean
//! attributes, self-closing tags and comments.

/// A located section body inside a component file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    pub content: &'a str,
    /// Byte offset of the opening `<`
    pub start: usize,
    /// Byte offset just past the closing tag
    pub end: usize,
}

/// An opening (or self-closing) tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub attributes: Vec<(String, Option<String>)>,
    pub self_closing: bool,
}

impl Tag {
    /// Value of the first attribute named `name` (names are lowercased).
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }
}

/// An `<include src="…" />` reference inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRef {
    pub src: String,
    pub start: usize,
    pub end: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAG PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':' || b == b'.' || b == b'_'
}

/// Parse the attributes of an opening tag whose name ends at `i`.
/// Returns the tag end (past `>`), the attributes and the self-closing flag.
fn parse_attributes(
    source: &str,
    mut i: usize,
) -> Option<(usize, Vec<(String, Option<String>)>, bool)> {
    let bytes = source.as_bytes();
    let mut attributes = Vec::new();

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }

        match bytes[i] {
            b'>' => return Some((i + 1, attributes, false)),
            b'/' if bytes.get(i + 1) == Some(&b'>') => return Some((i + 2, attributes, true)),
            b'/' => {
                i += 1;
                continue;
            }
            _ => {}
        }

        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        let name = source[name_start..i].to_ascii_lowercase();

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        if bytes.get(i) != Some(&b'=') {
            attributes.push((name, None));
            continue;
        }

        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }

        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' {
            let value_start = i + 1;
            let close = source[value_start..].find(quote as char)? + value_start;
            attributes.push((name, Some(source[value_start..close].to_string())));
            i = close + 1;
        } else {
            let value_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                i += 1;
            }
            let mut value_end = i;
            // `src=./a.box/>` reads as a self-closing tag, not a value ending in '/'
            if bytes.get(i) == Some(&b'>') && value_end > value_start && bytes[value_end - 1] == b'/'
            {
                value_end -= 1;
                attributes.push((name, Some(source[value_start..value_end].to_string())));
                return Some((i + 1, attributes, true));
            }
            attributes.push((name, Some(source[value_start..value_end].to_string())));
        }
    }
}

/// Parse an opening tag starting at `lt` (the `<`). When `expected` is given
/// the tag name must match it case-insensitively.
fn parse_open_tag(source: &str, lt: usize, expected: Option<&str>) -> Option<Tag> {
    let bytes = source.as_bytes();
    if bytes.get(lt) != Some(&b'<') {
        return None;
    }

    let name_start = lt + 1;
    if !bytes.get(name_start)?.is_ascii_alphabetic() {
        return None;
    }
    let mut name_end = name_start;
    while name_end < bytes.len() && is_name_byte(bytes[name_end]) {
        name_end += 1;
    }

    if let Some(expected) = expected {
        if !bytes[name_start..name_end].eq_ignore_ascii_case(expected.as_bytes()) {
            return None;
        }
    }

    match bytes.get(name_end) {
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
        _ => return None,
    }

    let (end, attributes, self_closing) = parse_attributes(source, name_end)?;
    Some(Tag {
        name: source[name_start..name_end].to_ascii_lowercase(),
        start: lt,
        end,
        attributes,
        self_closing,
    })
}

/// Find a closing tag `</name>` at or after `from`. Returns (start, end).
fn find_close_tag(source: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = source.as_bytes();
    let mut pos = from;

    while let Some(offset) = source.get(pos..)?.find("</") {
        let start = pos + offset;
        let name_start = start + 2;
        let name_end = name_start + name.len();
        if name_end <= bytes.len() && bytes[name_start..name_end].eq_ignore_ascii_case(name.as_bytes())
        {
            let mut i = name_end;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if bytes.get(i) == Some(&b'>') {
                return Some((start, i + 1));
            }
        }
        pos = start + 2;
    }

    None
}

/// Every `<` position at or after `from` that starts an opening tag named `name`.
fn next_open_tag(source: &str, from: usize, name: &str) -> Option<Tag> {
    let mut pos = from;
    while let Some(offset) = source.get(pos..)?.find('<') {
        let lt = pos + offset;
        if let Some(tag) = parse_open_tag(source, lt, Some(name)) {
            return Some(tag);
        }
        pos = lt + 1;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Locate the first `<name>…</name>` section. The body ends at the first
/// matching close tag.
pub fn find_section<'a>(source: &'a str, name: &str) -> Option<Section<'a>> {
    let mut from = 0;
    loop {
        let open = next_open_tag(source, from, name)?;
        if open.self_closing {
            from = open.end;
            continue;
        }
        let (close_start, close_end) = find_close_tag(source, open.end, name)?;
        return Some(Section {
            content: &source[open.end..close_start],
            start: open.start,
            end: close_end,
        });
    }
}

/// Like [`find_section`], but nested `<name>` elements inside the body are
/// balanced against their own close tags.
pub fn find_nested_section<'a>(source: &'a str, name: &str) -> Option<Section<'a>> {
    let open = next_open_tag(source, 0, name)?;
    if open.self_closing {
        return None;
    }

    let mut depth = 1usize;
    let mut pos = open.end;
    loop {
        let (close_start, close_end) = find_close_tag(source, pos, name)?;
        let nested_open = next_open_tag(source, pos, name).filter(|t| t.start < close_start);

        match nested_open {
            Some(tag) if !tag.self_closing => {
                depth += 1;
                pos = tag.end;
            }
            Some(tag) => pos = tag.end,
            None => {
                depth -= 1;
                if depth == 0 {
                    return Some(Section {
                        content: &source[open.end..close_start],
                        start: open.start,
                        end: close_end,
                    });
                }
                pos = close_end;
            }
        }
    }
}

/// Number of opening and closing tags named `name`.
pub fn count_tags(source: &str, name: &str) -> (usize, usize) {
    let mut opens = 0;
    let mut pos = 0;
    while let Some(tag) = next_open_tag(source, pos, name) {
        if !tag.self_closing {
            opens += 1;
        }
        pos = tag.end;
    }

    let mut closes = 0;
    pos = 0;
    while let Some((_, end)) = find_close_tag(source, pos, name) {
        closes += 1;
        pos = end;
    }

    (opens, closes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAG SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// All opening tags in document order. Comments are skipped.
pub fn scan_tags(source: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(offset) = source.get(pos..).and_then(|s| s.find('<')) {
        let lt = pos + offset;

        if source[lt..].starts_with("<!--") {
            match source[lt + 4..].find("-->") {
                Some(close) => {
                    pos = lt + 4 + close + 3;
                    continue;
                }
                None => break,
            }
        }

        match parse_open_tag(source, lt, None) {
            Some(tag) => {
                pos = tag.end;
                tags.push(tag);
            }
            None => pos = lt + 1,
        }
    }

    tags
}

/// Include references in document order, duplicates preserved.
pub fn find_includes(template: &str) -> Vec<IncludeRef> {
    scan_tags(template)
        .into_iter()
        .filter(|tag| tag.name == "include")
        .filter_map(|tag| {
            let src = tag.attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            Some(IncludeRef {
                src: src.to_string(),
                start: tag.start,
                end: tag.end,
            })
        })
        .collect()
}

/// Values of every `name` attribute in document order (`None` for a bare attribute).
pub fn attribute_values(source: &str, name: &str) -> Vec<Option<String>> {
    scan_tags(source)
        .into_iter()
        .flat_map(|tag| {
            tag.attributes
                .into_iter()
                .filter(|(n, _)| n == name)
                .map(|(_, v)| v)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_section_case_insensitive_with_attributes() {
        let src = "<STYLE lang=\"css\">.a { color: red; }</Style>";
        let section = find_section(src, "style").unwrap();
        assert_eq!(section.content, ".a { color: red; }");
        assert_eq!(section.end, src.len());
    }

    #[test]
    fn test_find_section_missing_close() {
        assert!(find_section("<script>let x = 1;", "script").is_none());
    }

    #[test]
    fn test_find_section_ignores_prefix_names() {
        let src = "<styles>no</styles><style>yes</style>";
        assert_eq!(find_section(src, "style").unwrap().content, "yes");
    }

    #[test]
    fn test_nested_template_balanced() {
        let src = "<template><ul><template id=\"row\"><li></li></template></ul></template><script>x</script>";
        let section = find_nested_section(src, "template").unwrap();
        assert_eq!(
            section.content,
            "<ul><template id=\"row\"><li></li></template></ul>"
        );
    }

    #[test]
    fn test_find_includes_quoted_unquoted_and_duplicates() {
        let template = r#"<include src="./a.box" /><p>x</p><include src='./b.box'><include src=./a.box/>"#;
        let srcs: Vec<String> = find_includes(template).into_iter().map(|i| i.src).collect();
        assert_eq!(srcs, vec!["./a.box", "./b.box", "./a.box"]);
    }

    #[test]
    fn test_find_includes_skips_comments_and_missing_src() {
        let template = r#"<!-- <include src="./hidden.box" /> --><include /><INCLUDE SRC="./x.box" />"#;
        let includes = find_includes(template);
        assert_eq!(includes.len(), 1);
        assert_eq!(includes[0].src, "./x.box");
        assert_eq!(&template[includes[0].start..includes[0].end], r#"<INCLUDE SRC="./x.box" />"#);
    }

    #[test]
    fn test_attribute_values() {
        let html = r#"<input box-bind="name"><span box-bind=""></span><p box-bind>"#;
        assert_eq!(
            attribute_values(html, "box-bind"),
            vec![Some("name".to_string()), Some(String::new()), None]
        );
    }

    #[test]
    fn test_count_tags() {
        let src = "<style>a</style><style>b";
        assert_eq!(count_tags(src, "style"), (2, 1));
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let src = "<p>héllo <é> wörld</p><include src=\"./ü.box\" />";
        let includes = find_includes(src);
        assert_eq!(includes[0].src, "./ü.box");
    }
}
