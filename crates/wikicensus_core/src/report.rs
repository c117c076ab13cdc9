use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::html::{Column, HtmlDocument, escape, link};
use crate::model::{CrawlResult, Edit, Page, REPORTED_STATUSES, ReadRestriction, Space};
use crate::table::{SortDirection, TableCell, TableRow, sorted_rows};

pub const SORT_SCRIPT: &str = include_str!("../assets/sortable.js");
pub const SORT_SCRIPT_FILENAME: &str = "sortable.js";
pub const DEFAULT_INDEX_FILENAME: &str = "index.html";
pub const UNASSIGNED_FILENAME: &str = "unassigned.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub output_dir: PathBuf,
    pub index_filename: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("html"),
            index_filename: DEFAULT_INDEX_FILENAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub files: Vec<PathBuf>,
}

/// `pages_{KEY}.html`. Keys with characters outside `[A-Za-z0-9_~-]` get
/// those replaced by `_` plus a `.{hex of the key}` suffix, so two keys never
/// share a file.
pub fn space_filename(key: &str) -> String {
    let is_safe = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '~' | '-');
    if key.chars().all(is_safe) {
        return format!("pages_{key}.html");
    }
    let safe: String = key
        .chars()
        .map(|ch| if is_safe(ch) { ch } else { '_' })
        .collect();
    let hex: String = key.bytes().map(|byte| format!("{byte:02x}")).collect();
    format!("pages_{safe}.{hex}.html")
}

pub fn render_index(result: &CrawlResult) -> String {
    render_index_page(result)
}

pub fn render_space_page(space: &Space) -> String {
    render_space_document(space, None)
}

pub fn render_unassigned(pages: &[Page]) -> String {
    render_unassigned_document(pages, None)
}

/// Full report: script, index, one page per space and the unassigned bucket.
pub fn write_report(result: &CrawlResult, options: &ReportOptions) -> Result<ReportSummary> {
    let mut summary = prepare_output(options)?;
    let index_path = options.output_dir.join(&options.index_filename);
    write_file(&index_path, &render_index(result), &mut summary)?;

    for space in result.spaces.values().filter(|space| space.pages_fetched) {
        let path = options.output_dir.join(space_filename(&space.key));
        let html = render_space_document(space, Some(&options.index_filename));
        write_file(&path, &html, &mut summary)?;
    }

    if !result.unassigned.is_empty() {
        let path = options.output_dir.join(UNASSIGNED_FILENAME);
        let html = render_unassigned_document(&result.unassigned, Some(&options.index_filename));
        write_file(&path, &html, &mut summary)?;
    }

    info!(
        "Wrote {} files to {}",
        summary.files.len(),
        options.output_dir.display()
    );
    Ok(summary)
}

/// Space pages only, for runs limited to a few named spaces. Pages found in
/// other spaces still land in the unassigned file.
pub fn write_space_pages(result: &CrawlResult, options: &ReportOptions) -> Result<ReportSummary> {
    let mut summary = prepare_output(options)?;
    for space in result.spaces.values() {
        let path = options.output_dir.join(space_filename(&space.key));
        write_file(&path, &render_space_document(space, None), &mut summary)?;
    }
    if !result.unassigned.is_empty() {
        let path = options.output_dir.join(UNASSIGNED_FILENAME);
        write_file(
            &path,
            &render_unassigned_document(&result.unassigned, None),
            &mut summary,
        )?;
    }
    info!(
        "Wrote {} files to {}",
        summary.files.len(),
        options.output_dir.display()
    );
    Ok(summary)
}

fn prepare_output(options: &ReportOptions) -> Result<ReportSummary> {
    fs::create_dir_all(&options.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            options.output_dir.display()
        )
    })?;
    let mut summary = ReportSummary::default();
    let script_path = options.output_dir.join(SORT_SCRIPT_FILENAME);
    write_file(&script_path, SORT_SCRIPT, &mut summary)?;
    Ok(summary)
}

fn write_file(path: &Path, contents: &str, summary: &mut ReportSummary) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    summary.files.push(path.to_path_buf());
    Ok(())
}

fn render_index_page(result: &CrawlResult) -> String {
    let with_pages = result.spaces.values().any(|space| space.pages_fetched);

    let mut columns = vec![Column::text("Space")];
    if with_pages {
        columns.push(Column::number("Pages"));
        columns.push(Column::number("Restricted"));
        columns.push(Column::number("Blog posts"));
        for status in &REPORTED_STATUSES {
            columns.push(Column::number(&status.label()));
        }
        columns.push(Column::text("Last modified"));
    }
    columns.extend([
        Column::text("Anonymous"),
        Column::text("Logged-in"),
        Column::text("Access"),
        Column::text("Admins"),
    ]);

    let rows: Vec<TableRow> = result
        .spaces
        .values()
        .map(|space| index_row(space, with_pages))
        .collect();
    let rows = sorted_rows(rows, 0, SortDirection::Ascending);
    let footer = index_footer(result, with_pages);

    let mut document = HtmlDocument::new("Wiki spaces", SORT_SCRIPT_FILENAME);
    document.heading("Wiki spaces");
    document.table(&columns, &rows, Some(&footer));
    if !result.unassigned.is_empty() {
        document.paragraph(&format!(
            "{}: {}",
            link(UNASSIGNED_FILENAME, "Pages without a crawled space"),
            result.unassigned.len()
        ));
    }
    document.finish()
}

fn index_row(space: &Space, with_pages: bool) -> TableRow {
    let title = escape(&space.display_title());
    let title_html = if space.pages_fetched {
        link(&space_filename(&space.key), &title)
    } else {
        title
    };
    let mut cells = vec![TableCell::html(space.key.clone(), title_html)];
    if with_pages {
        cells.push(TableCell::number(space.current_pages().len() as u64));
        cells.push(TableCell::number(space.restricted_count() as u64));
        cells.push(TableCell::number(space.blog_posts.len() as u64));
        for status in &REPORTED_STATUSES {
            cells.push(TableCell::number(space.pages_with_status(status).len() as u64));
        }
        cells.push(date_cell(space.last_modified()));
    }
    cells.push(flag_cell(space.access.anonymous_read));
    cells.push(flag_cell(space.access.logged_in_read));
    cells.push(TableCell::text(space.access.summary()));
    cells.push(TableCell::text(space.access.admins.join(", ")));
    TableRow::new(cells).with_class("space")
}

fn index_footer(result: &CrawlResult, with_pages: bool) -> TableRow {
    let spaces: Vec<&Space> = result.spaces.values().collect();

    let mut cells = vec![TableCell::text(format!("TOTAL: {} spaces", spaces.len()))];
    if with_pages {
        cells.push(total(&spaces, |s| s.current_pages().len()));
        cells.push(total(&spaces, Space::restricted_count));
        cells.push(total(&spaces, |s| s.blog_posts.len()));
        for status in &REPORTED_STATUSES {
            cells.push(total(&spaces, |s| s.pages_with_status(status).len()));
        }
        cells.push(date_cell(
            spaces.iter().filter_map(|space| space.last_modified()).max(),
        ));
    }
    cells.push(total(&spaces, |s| usize::from(s.access.anonymous_read)));
    cells.push(total(&spaces, |s| usize::from(s.access.logged_in_read)));
    cells.push(TableCell::text(""));
    cells.push(TableCell::text(""));
    TableRow::new(cells).with_class("total")
}

fn total(spaces: &[&Space], count: impl Fn(&Space) -> usize) -> TableCell {
    TableCell::number(spaces.iter().map(|space| count(space)).sum::<usize>() as u64)
}

fn render_space_document(space: &Space, index_filename: Option<&str>) -> String {
    let title = space.display_title();
    let current = space.current_pages();
    let descendants = space.descendant_counts();
    let restrictions = space.read_restrictions();
    let show_views = space
        .pages
        .iter()
        .chain(space.blog_posts.iter())
        .any(|page| page.views.is_some());
    let others = TableScope {
        descendants: None,
        restrictions: &restrictions,
        show_views: false,
        show_space: false,
    };

    let mut document = HtmlDocument::new(&title, SORT_SCRIPT_FILENAME);
    if let Some(index) = index_filename {
        document.paragraph(&link(index, "All spaces"));
    }
    document.heading(&title);
    document.paragraph(&format!(
        "{} pages, {} restricted",
        current.len(),
        space.restricted_count()
    ));
    let current_scope = TableScope {
        descendants: Some(&descendants),
        show_views,
        ..others
    };
    page_table(&mut document, current, &current_scope);

    for status in &REPORTED_STATUSES {
        let pages = space.pages_with_status(status);
        if !pages.is_empty() {
            document.subheading(&status.label(), pages.len());
            page_table(&mut document, pages, &others);
        }
    }
    if !space.blog_posts.is_empty() {
        document.subheading("Blog posts", space.blog_posts.len());
        let posts: Vec<&Page> = space.blog_posts.iter().collect();
        page_table(&mut document, posts, &TableScope { show_views, ..others });
    }
    document.finish()
}

fn render_unassigned_document(pages: &[Page], index_filename: Option<&str>) -> String {
    let mut document = HtmlDocument::new("Pages without a crawled space", SORT_SCRIPT_FILENAME);
    if let Some(index) = index_filename {
        document.paragraph(&link(index, "All spaces"));
    }
    document.heading("Pages without a crawled space");
    document.paragraph(&format!("{} pages", pages.len()));
    let restrictions = BTreeMap::new();
    let scope = TableScope {
        descendants: None,
        restrictions: &restrictions,
        show_views: pages.iter().any(|page| page.views.is_some()),
        show_space: true,
    };
    page_table(&mut document, pages.iter().collect(), &scope);
    document.finish()
}

/// Which optional columns a page table carries.
#[derive(Clone, Copy)]
struct TableScope<'a> {
    descendants: Option<&'a BTreeMap<String, usize>>,
    /// Pages missing here fall back to their own restrictions.
    restrictions: &'a BTreeMap<String, ReadRestriction>,
    show_views: bool,
    show_space: bool,
}

fn page_table(document: &mut HtmlDocument, mut pages: Vec<&Page>, scope: &TableScope<'_>) {
    let mut columns = vec![Column::text("Title")];
    if scope.show_space {
        columns.push(Column::text("Space"));
        columns.push(Column::text("Status"));
    }
    columns.extend([
        Column::text("Created by"),
        Column::text("Created"),
        Column::text("Last edited by"),
        Column::text("Last modified"),
    ]);
    if scope.descendants.is_some() {
        columns.push(Column::number("Descendants"));
    }
    if scope.show_views {
        columns.push(Column::number("Views"));
    }
    columns.push(Column::text("Labels"));

    // Id order first so equal titles keep a fixed order through the stable sort.
    pages.sort_by(|a, b| a.id.cmp(&b.id));
    let rows: Vec<TableRow> = pages
        .into_iter()
        .map(|page| {
            let restriction = scope
                .restrictions
                .get(&page.id)
                .copied()
                .unwrap_or(if page.has_own_restrictions() {
                    ReadRestriction::Restricted
                } else {
                    ReadRestriction::Open
                });
            let mut cells = vec![title_cell(page, restriction)];
            if scope.show_space {
                cells.push(TableCell::text(page.space_key.clone()));
                cells.push(TableCell::text(page.status.as_str()));
            }
            cells.push(person_cell(page.created.as_ref()));
            cells.push(date_cell(page.created.as_ref().map(|edit| edit.when)));
            cells.push(person_cell(page.last_edit.as_ref()));
            cells.push(date_cell(page.last_modified()));
            if let Some(counts) = scope.descendants {
                let count = counts.get(&page.id).copied().unwrap_or(0);
                cells.push(TableCell::number(count as u64));
            }
            if scope.show_views {
                cells.push(TableCell::optional_number(page.views));
            }
            cells.push(labels_cell(&page.labels));
            TableRow::new(cells)
        })
        .collect();
    let rows = sorted_rows(rows, 0, SortDirection::Ascending);
    document.table(&columns, &rows, None);
}

fn title_cell(page: &Page, restriction: ReadRestriction) -> TableCell {
    let title = if page.title.trim().is_empty() {
        "(untitled)"
    } else {
        page.title.as_str()
    };
    let mut html = match page.url.as_deref() {
        Some(url) => link(url, &escape(title)),
        None => escape(title),
    };
    match restriction {
        ReadRestriction::Open => {}
        ReadRestriction::Restricted => {
            let names = page
                .restrictions
                .as_ref()
                .map(|restrictions| restrictions.names().join(", "))
                .unwrap_or_default();
            html = format!(
                "<span class=\"restricted\">{html}</span> ({})",
                escape(&names)
            );
        }
        ReadRestriction::Inherited => {
            html = format!(
                "<span class=\"parent-restricted\" title=\"Below a restricted page\">{html}</span>"
            );
        }
    }
    TableCell::html(title, html)
}

fn labels_cell(labels: &[String]) -> TableCell {
    let html = labels
        .iter()
        .map(|label| format!("<span class=\"label\">{}</span>", escape(label)))
        .collect::<Vec<_>>()
        .join(" ");
    TableCell::html(labels.join(", "), html)
}

fn person_cell(edit: Option<&Edit>) -> TableCell {
    let Some(edit) = edit else {
        return TableCell::text("");
    };
    match edit.display_name() {
        (name, true) => TableCell::html(
            name,
            format!(
                "<span class=\"deactivated\" title=\"Deactivated\">{}</span>",
                escape(name)
            ),
        ),
        (name, false) => TableCell::text(name),
    }
}

fn date_cell(when: Option<DateTime<Utc>>) -> TableCell {
    TableCell::text(
        when.map(|when| when.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
    )
}

fn flag_cell(value: bool) -> TableCell {
    TableCell::text(if value { "yes" } else { "no" })
}
