//! The small markup subset assistant replies may use: `**bold**` spans and
//! line breaks.

const BOLD_MARK: &str = "**";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Span<'a> {
    Text(&'a str),
    Bold(&'a str),
    Break,
}

/// Splits a reply into spans. An unmatched `**` is kept as literal text.
fn spans(content: &str) -> Vec<Span<'_>> {
    let mut out = Vec::new();
    for (i, line) in content.split('\n').enumerate() {
        if i > 0 {
            out.push(Span::Break);
        }
        let mut rest = line;
        while let Some(start) = rest.find(BOLD_MARK) {
            let after = &rest[start + BOLD_MARK.len()..];
            let Some(end) = after.find(BOLD_MARK) else {
                break;
            };
            if start > 0 {
                out.push(Span::Text(&rest[..start]));
            }
            out.push(Span::Bold(&after[..end]));
            rest = &after[end + BOLD_MARK.len()..];
        }
        if !rest.is_empty() {
            out.push(Span::Text(rest));
        }
    }
    out
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Renders to HTML. Everything except the markup itself is escaped.
pub fn to_html(content: &str) -> String {
    let mut html = String::with_capacity(content.len());
    for span in spans(content) {
        match span {
            Span::Text(t) => escape_html(t.trim_end_matches('\r'), &mut html),
            Span::Bold(t) => {
                html.push_str("<b>");
                escape_html(t, &mut html);
                html.push_str("</b>");
            }
            Span::Break => html.push_str("<br/>"),
        }
    }
    html
}

/// Renders for a terminal, using ANSI bold for bold spans.
pub fn to_terminal(content: &str) -> String {
    let mut text = String::with_capacity(content.len());
    for span in spans(content) {
        match span {
            Span::Text(t) => text.push_str(t),
            Span::Bold(t) => {
                text.push_str("\x1b[1m");
                text.push_str(t);
                text.push_str("\x1b[0m");
            }
            Span::Break => text.push('\n'),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_and_breaks() {
        assert_eq!(
            to_html("**Selangor**: 4 balai\nKedah: 3"),
            "<b>Selangor</b>: 4 balai<br/>Kedah: 3"
        );
    }

    #[test]
    fn test_html_is_escaped() {
        assert_eq!(
            to_html("<script>alert('x')</script> & **<i>**"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; <b>&lt;i&gt;</b>"
        );
    }

    #[test]
    fn test_unmatched_marker_is_literal() {
        assert_eq!(to_html("a ** b"), "a ** b");
        assert_eq!(to_html("**a** and **b"), "<b>a</b> and **b");
    }

    #[test]
    fn test_bold_does_not_span_lines() {
        assert_eq!(to_html("**a\nb**"), "**a<br/>b**");
    }

    #[test]
    fn test_terminal_rendering() {
        assert_eq!(to_terminal("Jumlah: **40**\nSiap"), "Jumlah: \x1b[1m40\x1b[0m\nSiap");
    }
}
