//! HTML to Markdown conversion for inbound email bodies.
//!
//! Output dialect: `**bold**`, `_italic_`, `[text](href)`, `- ` / `1. ` lists,
//! ATX headers, backtick code, fenced `pre`, `> ` quotes. Blocks are
//! separated by one blank line and the result is trimmed.

use kuchiki::traits::*;
use kuchiki::{ElementData, NodeData, NodeRef};

pub fn html_to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let document = kuchiki::parse_html().one(html);
    let root = document
        .select_first("body")
        .map(|body| body.as_node().clone())
        .unwrap_or(document);

    let mut writer = MarkdownWriter::default();
    writer.render_children(&root);
    writer.finish()
}

#[derive(Debug, Clone, Copy)]
struct ListState {
    ordered: bool,
    next: u32,
}

#[derive(Debug, Default)]
struct MarkdownWriter {
    out: String,
    prefixes: Vec<String>,
    lists: Vec<ListState>,
    pending_breaks: usize,
    pending_space: bool,
    line_start: bool,
    item_opened: bool,
}

impl MarkdownWriter {
    fn finish(self) -> String {
        self.out.trim().to_string()
    }

    fn prefix(&self) -> String {
        self.prefixes.concat()
    }

    fn in_list_item(&self) -> bool {
        !self.lists.is_empty()
    }

    fn line_break(&mut self) {
        self.pending_breaks += 1;
        self.pending_space = false;
    }

    fn block_break(&mut self) {
        // Inside list items blocks only start a new line.
        let wanted = if self.in_list_item() { 1 } else { 2 };
        self.pending_breaks = self.pending_breaks.max(wanted);
        self.pending_space = false;
    }

    fn flush_breaks(&mut self) {
        if self.pending_breaks == 0 {
            return;
        }
        let count = self.pending_breaks;
        self.pending_breaks = 0;
        if self.out.is_empty() || self.item_opened {
            return;
        }
        let kept = self.out.trim_end_matches(' ').len();
        self.out.truncate(kept);
        for index in 0..count {
            if index > 0 {
                let prefix = self.prefix();
                self.out.push_str(prefix.trim_end());
            }
            self.out.push('\n');
        }
        self.line_start = true;
    }

    /// Writes an atomic piece of already-formatted text.
    fn write_inline(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.flush_breaks();
        if self.line_start || self.out.is_empty() {
            let prefix = self.prefix();
            self.out.push_str(&prefix);
            self.line_start = false;
        } else if self.pending_space && !self.item_opened {
            self.out.push(' ');
        }
        self.pending_space = false;
        self.item_opened = false;
        self.out.push_str(text);
    }

    fn write_text(&mut self, raw: &str) {
        let mut words = raw.split_whitespace().peekable();
        if words.peek().is_none() {
            if !raw.is_empty() {
                self.pending_space = true;
            }
            return;
        }
        if raw.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (index, word) in words.enumerate() {
            if index > 0 {
                self.pending_space = true;
            }
            self.write_inline(word);
        }
        if raw.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn render_children(&mut self, node: &NodeRef) {
        for child in node.children() {
            self.render_node(&child);
        }
    }

    fn render_node(&mut self, node: &NodeRef) {
        match node.data() {
            NodeData::Text(text) => {
                let text = text.borrow().clone();
                self.write_text(&text);
            }
            NodeData::Element(element) => self.render_element(node, element),
            NodeData::Document(_) | NodeData::DocumentFragment => self.render_children(node),
            _ => {}
        }
    }

    fn render_element(&mut self, node: &NodeRef, element: &ElementData) {
        let tag = element.name.local.as_ref();
        match tag {
            "script" | "style" | "head" | "title" | "meta" | "link" | "noscript" | "template" => {}
            "strong" | "b" => self.render_wrapped(node, "**"),
            "em" | "i" => self.render_wrapped(node, "_"),
            "code" | "tt" | "kbd" => self.render_code(node),
            "a" => self.render_link(node, element),
            "img" => self.render_image(element),
            "br" => self.line_break(),
            "hr" => {
                self.block_break();
                self.write_inline("- - -");
                self.block_break();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                let (inner, _, _) = render_inline(node);
                if inner.is_empty() {
                    return;
                }
                self.block_break();
                self.write_inline(&format!("{} {}", "#".repeat(level), inner));
                self.block_break();
            }
            "blockquote" => {
                self.block_break();
                self.flush_breaks();
                self.prefixes.push("> ".to_string());
                self.render_children(node);
                self.prefixes.pop();
                self.block_break();
            }
            "pre" => self.render_pre(node),
            "ul" | "ol" => self.render_list(node, element, tag == "ol"),
            "li" => self.render_list_item(node),
            "tr" => {
                self.line_break_once();
                self.render_table_row(node);
                self.line_break_once();
            }
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "aside"
            | "nav" | "table" | "thead" | "tbody" | "tfoot" | "form" | "fieldset"
            | "address" | "center" | "figure" | "figcaption" | "dl" | "dt" | "dd" => {
                self.block_break();
                self.render_children(node);
                self.block_break();
            }
            _ => self.render_children(node),
        }
    }

    fn render_wrapped(&mut self, node: &NodeRef, delimiter: &str) {
        let (inner, leading, trailing) = render_inline(node);
        if inner.is_empty() {
            if leading || trailing {
                self.pending_space = true;
            }
            return;
        }
        if leading {
            self.pending_space = true;
        }
        self.write_inline(&format!("{}{}{}", delimiter, inner, delimiter));
        if trailing {
            self.pending_space = true;
        }
    }

    fn render_code(&mut self, node: &NodeRef) {
        let text = collapse_whitespace(&node.text_contents());
        if text.is_empty() {
            return;
        }
        let fence = if text.contains('`') { "``" } else { "`" };
        self.write_inline(&format!("{}{}{}", fence, text, fence));
    }

    fn render_link(&mut self, node: &NodeRef, element: &ElementData) {
        let href = element
            .attributes
            .borrow()
            .get("href")
            .map(|value| value.trim().to_string())
            .filter(|value| is_safe_link(value));
        let Some(href) = href else {
            self.render_children(node);
            return;
        };
        let (text, leading, trailing) = render_inline(node);
        if leading {
            self.pending_space = true;
        }
        if text.is_empty() || text == href {
            self.write_inline(&href);
        } else {
            self.write_inline(&format!("[{}]({})", text, href));
        }
        if trailing {
            self.pending_space = true;
        }
    }

    fn render_image(&mut self, element: &ElementData) {
        let attrs = element.attributes.borrow();
        let Some(src) = attrs
            .get("src")
            .map(str::trim)
            .filter(|value| is_safe_link(value))
        else {
            return;
        };
        let alt = collapse_whitespace(attrs.get("alt").unwrap_or(""));
        let markdown = format!("![{}]({})", alt, src);
        drop(attrs);
        self.write_inline(&markdown);
    }

    fn render_pre(&mut self, node: &NodeRef) {
        let text = node.text_contents();
        let text = text.trim_matches('\n');
        self.block_break();
        self.write_inline("```");
        for line in text.lines() {
            self.line_break();
            if line.is_empty() {
                continue;
            }
            self.flush_breaks();
            let prefix = self.prefix();
            self.out.push_str(&prefix);
            self.out.push_str(line.trim_end());
            self.line_start = false;
        }
        self.line_break();
        self.write_inline("```");
        self.block_break();
    }

    fn render_list(&mut self, node: &NodeRef, element: &ElementData, ordered: bool) {
        let start = element
            .attributes
            .borrow()
            .get("start")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(1);
        if self.in_list_item() {
            // A list opening an item starts on the line after the marker.
            self.item_opened = false;
            self.line_break_once();
        } else {
            self.block_break();
        }
        self.lists.push(ListState {
            ordered,
            next: start,
        });
        self.render_children(node);
        self.lists.pop();
        self.block_break();
    }

    fn render_list_item(&mut self, node: &NodeRef) {
        let marker = match self.lists.last_mut() {
            Some(list) if list.ordered => {
                let marker = format!("{}. ", list.next);
                list.next = list.next.saturating_add(1);
                marker
            }
            _ => "- ".to_string(),
        };
        self.line_break_once();
        self.write_inline(&marker);
        self.item_opened = true;
        self.prefixes.push(" ".repeat(marker.len()));
        self.render_children(node);
        self.prefixes.pop();
        self.item_opened = false;
        self.line_break_once();
    }

    fn render_table_row(&mut self, row: &NodeRef) {
        let mut first = true;
        for cell in row.children() {
            let is_cell = cell
                .as_element()
                .map(|element| matches!(element.name.local.as_ref(), "td" | "th"))
                .unwrap_or(false);
            if !is_cell {
                continue;
            }
            if !first {
                self.write_inline("|");
            }
            self.pending_space = !first;
            self.render_children(&cell);
            self.pending_space = true;
            first = false;
        }
    }

    fn line_break_once(&mut self) {
        self.pending_breaks = self.pending_breaks.max(1);
        self.pending_space = false;
    }
}

/// Renders inline content to a single line and reports surrounding whitespace.
fn render_inline(node: &NodeRef) -> (String, bool, bool) {
    let raw = node.text_contents();
    let leading = raw.starts_with(char::is_whitespace);
    let trailing = raw.ends_with(char::is_whitespace);

    let mut writer = MarkdownWriter::default();
    for child in node.children() {
        match child.data() {
            NodeData::Element(element) if element.name.local.as_ref() == "br" => {
                writer.pending_space = true;
            }
            _ => writer.render_node(&child),
        }
    }
    let inner = collapse_whitespace(&writer.finish());
    (inner, leading, trailing)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_safe_link(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let lower = value.to_ascii_lowercase();
    !(lower.starts_with("javascript:") || lower.starts_with("vbscript:"))
}

#[cfg(test)]
mod tests {
    use super::html_to_markdown;

    #[test]
    fn strong_paragraph_has_no_wrapping_artifacts() {
        assert_eq!(html_to_markdown("<p><strong>boo</strong></p>"), "**boo**");
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(html_to_markdown(""), "");
        assert_eq!(html_to_markdown("   \n"), "");
    }

    #[test]
    fn bold_and_italic_variants() {
        assert_eq!(html_to_markdown("<b>bold</b> and <i>it</i>"), "**bold** and _it_");
        assert_eq!(html_to_markdown("<em>x</em><strong>y</strong>"), "_x_**y**");
    }

    #[test]
    fn whitespace_inside_emphasis_moves_outside() {
        assert_eq!(html_to_markdown("a<strong> b </strong>c"), "a **b** c");
    }

    #[test]
    fn paragraphs_and_divs_become_blocks() {
        assert_eq!(
            html_to_markdown("<div>first</div><p>second\n   line</p>"),
            "first\n\nsecond line"
        );
    }

    #[test]
    fn line_breaks_are_kept() {
        assert_eq!(html_to_markdown("one<br>two<br/>three"), "one\ntwo\nthree");
    }

    #[test]
    fn links_and_images() {
        assert_eq!(
            html_to_markdown(r#"see <a href="https://example.com">the site</a>"#),
            "see [the site](https://example.com)"
        );
        assert_eq!(
            html_to_markdown(r#"<a href="https://example.com">https://example.com</a>"#),
            "https://example.com"
        );
        assert_eq!(
            html_to_markdown(r#"<a href="javascript:alert(1)">click</a>"#),
            "click"
        );
        assert_eq!(
            html_to_markdown(r#"<img src="https://example.com/a.png" alt="logo">"#),
            "![logo](https://example.com/a.png)"
        );
    }

    #[test]
    fn unordered_and_ordered_lists() {
        assert_eq!(
            html_to_markdown("<ul><li>one</li><li>two</li></ul>"),
            "- one\n- two"
        );
        assert_eq!(
            html_to_markdown("<ol><li>one</li><li>two</li></ol>"),
            "1. one\n2. two"
        );
    }

    #[test]
    fn nested_lists_are_indented() {
        assert_eq!(
            html_to_markdown("<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>"),
            "- a\n  - b\n- c"
        );
    }

    #[test]
    fn list_opening_an_item_starts_on_its_own_line() {
        assert_eq!(
            html_to_markdown("<ul><li><ul><li>x</li></ul></li></ul>"),
            "-\n  - x"
        );
    }

    #[test]
    fn ordered_list_counter_saturates() {
        assert_eq!(
            html_to_markdown(r#"<ol start="4294967295"><li>a</li><li>b</li></ol>"#),
            "4294967295. a\n4294967295. b"
        );
        assert_eq!(
            html_to_markdown(r#"<ol start="3"><li>a</li><li>b</li></ol>"#),
            "3. a\n4. b"
        );
    }

    #[test]
    fn paragraphs_inside_list_items_stay_tight() {
        assert_eq!(
            html_to_markdown("<ul><li><p>one</p></li><li><p>two</p></li></ul>"),
            "- one\n- two"
        );
    }

    #[test]
    fn headers_quotes_and_rules() {
        assert_eq!(
            html_to_markdown("<h2>Title</h2><blockquote>quoted</blockquote><hr><p>end</p>"),
            "## Title\n\n> quoted\n\n- - -\n\nend"
        );
    }

    #[test]
    fn empty_headers_are_dropped() {
        assert_eq!(html_to_markdown("<h1></h1><p>x</p>"), "x");
        assert_eq!(html_to_markdown("<h3> <b>Due</b> soon </h3>"), "### **Due** soon");
    }

    #[test]
    fn code_and_pre() {
        assert_eq!(html_to_markdown("run <code>cargo test</code>"), "run `cargo test`");
        assert_eq!(
            html_to_markdown("<pre>fn main() {\n    go();\n}</pre>"),
            "```\nfn main() {\n    go();\n}\n```"
        );
    }

    #[test]
    fn scripts_styles_and_comments_are_dropped() {
        assert_eq!(
            html_to_markdown(
                "<html><head><style>p{}</style></head><body><!-- hi --><script>x()</script><p>kept</p></body></html>"
            ),
            "kept"
        );
    }

    #[test]
    fn table_rows_become_lines() {
        assert_eq!(
            html_to_markdown("<table><tr><td>a</td><td>b</td></tr><tr><td>c</td><td>d</td></tr></table>"),
            "a | b\nc | d"
        );
    }
}
