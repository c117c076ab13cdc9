use std::fmt::Write as _;

use crate::table::TableRow;

const HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<style>
html { font-family: sans-serif; }
table { border-collapse: collapse; }
td, th { padding: .25em .5em; text-align: left; vertical-align: top; }
td.right, th.right { text-align: right; }
th { cursor: pointer; border-bottom: 1px solid #888; white-space: nowrap; }
th.sorted-asc::after { content: " \25B4"; }
th.sorted-desc::after { content: " \25BE"; }
tbody tr:nth-child(even) { background: #f6f6f6; }
tfoot td { border-top: 1px solid #888; font-weight: bold; }
.deactivated { color: #888; }
.restricted { background: #ffcccc; padding: 2px; }
.parent-restricted { background: #ffff44; padding: 2px; }
.label { font-size: 80%; background: #e0e8f0; border-radius: 3px; padding: 0 .3em; margin-right: .2em; }
sup { vertical-align: top; font-size: 0.6em; }
"#;

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn link(href: &str, inner_html: &str) -> String {
    format!("<a href=\"{}\">{inner_html}</a>", escape(href))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub label: String,
    pub numeric: bool,
}

impl Column {
    pub fn text(label: &str) -> Self {
        Self {
            label: label.to_string(),
            numeric: false,
        }
    }

    pub fn number(label: &str) -> Self {
        Self {
            label: label.to_string(),
            numeric: true,
        }
    }
}

/// One generated document: head with styles and the sort script, then body.
pub struct HtmlDocument {
    out: String,
}

impl HtmlDocument {
    pub fn new(title: &str, script_src: &str) -> Self {
        let mut out = String::from(HEAD);
        out.push_str("</style>\n");
        let _ = writeln!(out, "<script src=\"{}\" defer></script>", escape(script_src));
        let _ = writeln!(out, "<title>{}</title>", escape(title));
        out.push_str("</head>\n<body>\n");
        Self { out }
    }

    pub fn heading(&mut self, text: &str) {
        let _ = writeln!(self.out, "<h1>{}</h1>", escape(text));
    }

    pub fn subheading(&mut self, text: &str, count: usize) {
        let _ = writeln!(
            self.out,
            "<h2>{} <span class=\"count\">[{count}]</span></h2>",
            escape(text)
        );
    }

    pub fn paragraph(&mut self, inner_html: &str) {
        let _ = writeln!(self.out, "<p>{inner_html}</p>");
    }

    pub fn table(&mut self, columns: &[Column], rows: &[TableRow], footer: Option<&TableRow>) {
        self.out.push_str("<table class=\"sortable\">\n<thead><tr>");
        for column in columns {
            let class = if column.numeric { " class=\"right\"" } else { "" };
            let _ = write!(self.out, "<th{class}>{}</th>", escape(&column.label));
        }
        self.out.push_str("</tr></thead>\n<tbody>\n");
        for row in rows {
            self.row(row);
        }
        self.out.push_str("</tbody>\n");
        if let Some(footer) = footer {
            self.out.push_str("<tfoot>\n");
            self.row(footer);
            self.out.push_str("</tfoot>\n");
        }
        self.out.push_str("</table>\n");
    }

    fn row(&mut self, row: &TableRow) {
        match &row.class {
            Some(class) => {
                let _ = write!(self.out, "<tr class=\"{}\">", escape(class));
            }
            None => self.out.push_str("<tr>"),
        }
        for cell in &row.cells {
            let class = if cell.numeric { " class=\"right\"" } else { "" };
            let _ = write!(
                self.out,
                "<td{class} data-sort=\"{}\">{}</td>",
                escape(&cell.text),
                cell.html
            );
        }
        self.out.push_str("</tr>\n");
    }

    pub fn finish(mut self) -> String {
        self.out.push_str("</body>\n</html>\n");
        self.out
    }
}
