use std::collections::BTreeSet;

use log::{debug, info, warn};

use crate::access::space_from_api;
use crate::api::{Cursor, Listing, WikiReadApi};
use crate::error::CrawlError;
use crate::model::{ContentKind, CrawlResult, PagePlacement, PageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Walk every space's content listings, not just the space list.
    pub include_pages: bool,
    /// Ask the analytics endpoint for view counts when a session credential exists.
    pub fetch_views: bool,
    /// Look up each page's read restrictions.
    pub fetch_restrictions: bool,
    pub fetch_labels: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            include_pages: true,
            fetch_views: true,
            fetch_restrictions: true,
            fetch_labels: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFetchStats {
    pub listed: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub duplicates: usize,
    pub views_fetched: usize,
    pub views_missing: usize,
    pub details_missing: usize,
}

/// Every space, then (optionally) every space's pages and blog posts.
pub fn crawl_all<A: WikiReadApi>(
    api: &mut A,
    options: &CrawlOptions,
) -> Result<CrawlResult, CrawlError> {
    let mut result = CrawlResult::new();
    fetch_spaces(api, &mut result)?;
    if options.include_pages {
        fetch_pages(api, &mut result, options)?;
    }
    info!(
        "Crawl finished: {} spaces, {} pages, {} requests",
        result.spaces.len(),
        result.page_count(),
        api.request_count()
    );
    Ok(result)
}

/// Only the named spaces, always with their pages.
pub fn crawl_space_keys<A: WikiReadApi>(
    api: &mut A,
    keys: &[String],
    options: &CrawlOptions,
) -> Result<CrawlResult, CrawlError> {
    let mut result = CrawlResult::new();
    for key in keys {
        fetch_space(api, &mut result, key)?;
    }
    fetch_pages(api, &mut result, options)?;
    Ok(result)
}

pub fn fetch_spaces<A: WikiReadApi>(
    api: &mut A,
    result: &mut CrawlResult,
) -> Result<usize, CrawlError> {
    info!("Getting spaces");
    let records = collect_listing("spaces", |cursor| api.list_spaces(cursor))?;
    let listed = records.len();
    let mut added = 0usize;
    for record in records {
        let key = record.key.clone();
        if result.insert_space(space_from_api(record)) {
            added += 1;
        } else {
            debug!("Skipping repeated space {key}");
        }
    }
    info!("Found {added} spaces ({listed} listed)");
    Ok(added)
}

pub fn fetch_space<A: WikiReadApi>(
    api: &mut A,
    result: &mut CrawlResult,
    key: &str,
) -> Result<(), CrawlError> {
    let record = api.get_space(key)?;
    if !result.insert_space(space_from_api(record)) {
        debug!("Skipping repeated space {key}");
    }
    Ok(())
}

pub fn fetch_pages<A: WikiReadApi>(
    api: &mut A,
    result: &mut CrawlResult,
    options: &CrawlOptions,
) -> Result<PageFetchStats, CrawlError> {
    let with_views = options.fetch_views && api.has_session();
    if options.fetch_views && !with_views {
        info!("No session credential; view counts will be left empty");
    }

    let keys: Vec<String> = result.spaces.keys().cloned().collect();
    let mut stats = PageFetchStats::default();
    for key in keys {
        fetch_space_pages(api, result, &key, with_views, options, &mut stats)?;
        result.mark_pages_fetched(&key);
    }
    if stats.unassigned > 0 {
        warn!(
            "{} pages belong to spaces that were not crawled; they are listed in the unassigned report",
            stats.unassigned
        );
    }
    if stats.details_missing > 0 {
        warn!(
            "{} restriction or label lookups failed; those pages show as unrestricted or unlabeled",
            stats.details_missing
        );
    }
    Ok(stats)
}

fn fetch_space_pages<A: WikiReadApi>(
    api: &mut A,
    result: &mut CrawlResult,
    space_key: &str,
    with_views: bool,
    options: &CrawlOptions,
    stats: &mut PageFetchStats,
) -> Result<(), CrawlError> {
    let site = api.site().to_string();
    for kind in [ContentKind::Page, ContentKind::BlogPost] {
        info!("Getting {}s from {space_key}", kind.as_api_str());
        let label = format!("{} {space_key}", kind.as_api_str());
        let records = collect_listing(&label, |cursor| api.list_content(space_key, kind, cursor))?;
        stats.listed += records.len();

        for record in records {
            let mut page = record.into_page(&site, space_key, kind);
            if result.has_page(&page.id) {
                stats.duplicates += 1;
                continue;
            }
            if with_views && page.kind == ContentKind::Page && page.status == PageStatus::Current
            {
                match api.page_views(&page.id) {
                    Ok(views) => {
                        page.views = Some(views);
                        stats.views_fetched += 1;
                    }
                    Err(error) => {
                        warn!("{error}");
                        stats.views_missing += 1;
                    }
                }
            }
            if options.fetch_restrictions && !page.id.is_empty() {
                match api.page_restrictions(&page.id) {
                    Ok(restrictions) => page.restrictions = Some(restrictions),
                    Err(error) => {
                        warn!("Read restrictions unavailable for page {}: {error}", page.id);
                        stats.details_missing += 1;
                    }
                }
            }
            if options.fetch_labels && !page.id.is_empty() && page.status != PageStatus::Archived
            {
                match api.page_labels(&page.id) {
                    Ok(labels) => page.labels = labels,
                    Err(error) => {
                        warn!("Labels unavailable for page {}: {error}", page.id);
                        stats.details_missing += 1;
                    }
                }
            }
            match result.add_page(page) {
                PagePlacement::Assigned => stats.assigned += 1,
                PagePlacement::Unassigned => stats.unassigned += 1,
                PagePlacement::Duplicate => stats.duplicates += 1,
            }
        }
    }
    Ok(())
}

/// Follow `next` links until the server stops handing them out or a page
/// comes back empty.
fn collect_listing<T>(
    label: &str,
    mut fetch_page: impl FnMut(&Cursor) -> Result<Listing<T>, CrawlError>,
) -> Result<Vec<T>, CrawlError> {
    let mut items = Vec::new();
    let mut cursor = Cursor::Start;
    let mut seen_links = BTreeSet::new();

    loop {
        let listing = fetch_page(&cursor)?;
        if listing.results.is_empty() {
            break;
        }
        let next = listing.next_link().map(str::to_string);
        debug!("{label}: {} items in listing page", listing.results.len());
        items.extend(listing.results);

        match next {
            Some(link) => {
                if !seen_links.insert(link.clone()) {
                    warn!("{label}: pagination link {link} repeated; stopping");
                    break;
                }
                cursor = Cursor::Next(link);
            }
            None => break,
        }
    }

    Ok(items)
}
