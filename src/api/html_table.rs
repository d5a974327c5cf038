//! Structural HTML table extraction.
//!
//! Upstream markup obfuscates class names, so tables are located by position
//! (nth table after a scope marker, body row order, cell index) rather than by
//! selectors. Matching is ASCII case-insensitive; offsets into the lowercased
//! copy are valid in the original because ASCII lowercasing keeps byte lengths.

/// Elements whose attributes name assets rather than page content
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "link", "meta", "noscript"];

/// Elements whose content is raw text, not markup
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Slice of `html` starting at the first opening tag whose attributes contain `marker`.
///
/// Occurrences in text content, closing tags, comments, asset tags and
/// script or style bodies are skipped.
pub fn scope_from_tag<'a>(html: &'a str, marker: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let marker = marker.to_ascii_lowercase();
    if marker.is_empty() {
        return None;
    }

    let mut from = 0;
    while let Some(found) = lower.get(from..)?.find(&marker) {
        let at = from + found;
        if let Some(tag_start) = opening_tag_around(&lower, at) {
            return Some(&html[tag_start..]);
        }
        from = at + marker.len();
    }

    None
}

/// Name of the first tag in a fragment, e.g. `div` for `<div class=..>`
pub fn leading_tag_name(fragment: &str) -> Option<String> {
    let rest = fragment.trim_start().strip_prefix('<')?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!name.is_empty()).then(|| name.to_ascii_lowercase())
}

/// Every complete `<tag ...>...</tag>` block, outermost first, nesting-aware
pub fn tag_blocks<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}", tag.to_ascii_lowercase());

    let mut blocks = Vec::new();
    let mut from = 0;

    while let Some(start) = find_open(&lower, &open, from) {
        match block_end(&lower, &open, &close, start) {
            Some(end) => {
                blocks.push(&html[start..end]);
                from = end;
            }
            None => break,
        }
    }

    blocks
}

/// Rows of the table body (first `<tbody>` when present)
pub fn body_rows(table: &str) -> Vec<&str> {
    let inner = inner(table);
    let scope = tag_blocks(inner, "tbody")
        .into_iter()
        .next()
        .map(self::inner)
        .unwrap_or(inner);

    tag_blocks(scope, "tr")
}

/// Text of every `<td>` in a row
pub fn cell_texts(row: &str) -> Vec<String> {
    tag_blocks(inner(row), "td").into_iter().map(text).collect()
}

/// Content between the opening tag and the closing tag of a block
pub fn inner(block: &str) -> &str {
    match (block.find('>'), block.rfind('<')) {
        (Some(open_end), Some(close_start)) if close_start > open_end => {
            &block[open_end + 1..close_start]
        }
        _ => "",
    }
}

/// Visible text of a fragment with tags stripped and whitespace collapsed
pub fn text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;

    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    normalize_ws(&decode_entities(&out))
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Start of the content element whose opening tag spans offset `at`
fn opening_tag_around(lower: &str, at: usize) -> Option<usize> {
    let tag_start = lower[..at].rfind('<')?;
    if lower[tag_start..at].contains('>') {
        return None;
    }

    let name = leading_tag_name(&lower[tag_start..])?;
    if NON_CONTENT_TAGS.contains(&name.as_str()) {
        return None;
    }
    if RAW_TEXT_TAGS.iter().any(|tag| inside_element(lower, tag_start, tag)) {
        return None;
    }

    Some(tag_start)
}

/// Whether `pos` falls between an opening `<tag` and its close
fn inside_element(lower: &str, pos: usize, tag: &str) -> bool {
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);
    match lower[..pos].rfind(&open) {
        Some(start) => !lower[start..pos].contains(&close),
        None => false,
    }
}

/// Next `<tag` that is really that tag (not `<tbody` when looking for `<tb`)
fn find_open(lower: &str, open: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    loop {
        let idx = lower.get(pos..)?.find(open)? + pos;
        let after = lower[idx + open.len()..].chars().next();
        if matches!(after, Some(c) if c.is_ascii_whitespace() || c == '>' || c == '/') {
            return Some(idx);
        }
        pos = idx + open.len();
    }
}

/// Byte offset just past the `>` of the close tag matching the open at `start`
fn block_end(lower: &str, open: &str, close: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;

    loop {
        let next_close = lower.get(pos..)?.find(close)? + pos;

        match find_open(lower, open, pos) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                pos = next_open + open.len();
            }
            _ => {
                depth = depth.saturating_sub(1);
                let end = lower[next_close..].find('>')? + next_close + 1;
                if depth == 0 {
                    return Some(end);
                }
                pos = end;
            }
        }
    }
}
