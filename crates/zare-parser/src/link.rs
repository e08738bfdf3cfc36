//! Stylesheet and script injection into a rendered page.

use std::sync::LazyLock;

use regex::Regex;

static HEAD_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap());

const TITLE_CLOSE: &str = "</title>";

/// Assets are pending but the page has nowhere to put them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Head tag is required to link {0}")]
pub struct MissingHead(pub &'static str);

/// Insert `<link>` tags for `stylesheets` and `<script>` tags for `scripts`
/// right after `</title>`, or after the opening `<head>` tag when there is no
/// title. Stylesheets come first, each group in declaration order, one tag
/// per line.
pub fn link_static(
    html: &str,
    stylesheets: &[String],
    scripts: &[String],
) -> Result<String, MissingHead> {
    if stylesheets.is_empty() && scripts.is_empty() {
        return Ok(html.to_string());
    }

    let Some(head) = HEAD_TAG.find(html) else {
        let what = if scripts.is_empty() { "stylesheets" } else { "scripts" };
        return Err(MissingHead(what));
    };
    let at = match html[head.start()..].find(TITLE_CLOSE) {
        Some(offset) => head.start() + offset + TITLE_CLOSE.len(),
        None => head.end(),
    };

    let mut tags = String::new();
    for href in stylesheets {
        tags.push_str(&format!("\n<link rel=\"stylesheet\" href=\"{href}\" />"));
    }
    for src in scripts {
        tags.push_str(&format!("\n<script src=\"{src}\" defer></script>"));
    }

    let mut out = String::with_capacity(html.len() + tags.len());
    out.push_str(&html[..at]);
    out.push_str(&tags);
    out.push_str(&html[at..]);
    Ok(out)
}

/// `path` with `.extension` appended unless it already ends with it.
pub fn with_asset_extension(path: &str, extension: &str) -> String {
    let suffix = format!(".{extension}");
    if path.ends_with(&suffix) {
        path.to_string()
    } else {
        format!("{path}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_after_title() {
        let html = "<html><head><title>Home</title></head></html>";
        let out = link_static(html, &strings(&["/a.css"]), &strings(&["/app.js"])).unwrap();
        assert_eq!(
            out,
            "<html><head><title>Home</title>\n<link rel=\"stylesheet\" href=\"/a.css\" />\n<script src=\"/app.js\" defer></script></head></html>"
        );
    }

    #[test]
    fn test_after_head_without_title() {
        let html = "<HEAD lang=\"en\"><meta charset=\"utf-8\"></HEAD>";
        let out = link_static(html, &strings(&["/a.css", "/b.css"]), &[]).unwrap();
        assert_eq!(
            out,
            "<HEAD lang=\"en\">\n<link rel=\"stylesheet\" href=\"/a.css\" />\n<link rel=\"stylesheet\" href=\"/b.css\" /><meta charset=\"utf-8\"></HEAD>"
        );
    }

    #[test]
    fn test_header_is_not_head() {
        let err = link_static("<header>x</header>", &[], &strings(&["/app.js"])).unwrap_err();
        assert_eq!(err.to_string(), "Head tag is required to link scripts");
    }

    #[test]
    fn test_nothing_pending() {
        assert_eq!(link_static("<p>x</p>", &[], &[]).unwrap(), "<p>x</p>");
    }

    #[test]
    fn test_asset_extension() {
        assert_eq!(with_asset_extension("/css/main", "css"), "/css/main.css");
        assert_eq!(with_asset_extension("/css/main.css", "css"), "/css/main.css");
        assert_eq!(with_asset_extension("./app", "js"), "./app.js");
    }
}
