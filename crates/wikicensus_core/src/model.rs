use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

const DEACTIVATED_SUFFIX: &str = " (Deactivated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentKind {
    Page,
    BlogPost,
}

impl ContentKind {
    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::BlogPost => "blogpost",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("blogpost") {
            Self::BlogPost
        } else {
            Self::Page
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageStatus {
    Current,
    Draft,
    Archived,
    Trashed,
    Other(String),
}

/// Statuses that get their own section and index column next to current pages.
pub const REPORTED_STATUSES: [PageStatus; 3] =
    [PageStatus::Draft, PageStatus::Archived, PageStatus::Trashed];

impl PageStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "current" => Self::Current,
            "draft" => Self::Draft,
            "archived" => Self::Archived,
            "trashed" => Self::Trashed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Current => "current",
            Self::Draft => "draft",
            Self::Archived => "archived",
            Self::Trashed => "trashed",
            Self::Other(value) => value,
        }
    }

    /// Capitalized label for headings, e.g. `Archived`.
    pub fn label(&self) -> String {
        let text = self.as_str();
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub who: String,
    pub when: DateTime<Utc>,
}

impl Edit {
    /// Display name without the deactivation marker, and whether it was present.
    pub fn display_name(&self) -> (&str, bool) {
        match self.who.strip_suffix(DEACTIVATED_SUFFIX) {
            Some(name) => (name, true),
            None => (self.who.as_str(), false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub kind: ContentKind,
    pub status: PageStatus,
    pub space_key: String,
    pub url: Option<String>,
    pub parent_id: Option<String>,
    pub created: Option<Edit>,
    pub last_edit: Option<Edit>,
    pub views: Option<u64>,
    /// Read restrictions set on the page itself; `None` when not fetched.
    pub restrictions: Option<PageRestrictions>,
    pub labels: Vec<String>,
}

impl Page {
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_edit
            .as_ref()
            .or(self.created.as_ref())
            .map(|edit| edit.when)
    }

    pub fn has_own_restrictions(&self) -> bool {
        self.restrictions
            .as_ref()
            .is_some_and(|restrictions| !restrictions.is_empty())
    }
}

/// Groups and users a page's read access is limited to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRestrictions {
    pub groups: Vec<String>,
    pub users: Vec<String>,
}

impl PageRestrictions {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.users.is_empty()
    }

    /// Groups and users together, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .groups
            .iter()
            .chain(self.users.iter())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRestriction {
    Open,
    /// The page carries its own read restriction.
    Restricted,
    /// An ancestor page is restricted.
    Inherited,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceAccess {
    pub anonymous_read: bool,
    pub logged_in_read: bool,
    pub admins: Vec<String>,
}

impl SpaceAccess {
    pub fn summary(&self) -> &'static str {
        match (self.anonymous_read, self.logged_in_read) {
            (false, false) => "Internal",
            (false, true) => "Logged-in",
            (true, true) => "Open",
            (true, false) => "???",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub key: String,
    pub name: Option<String>,
    pub access: SpaceAccess,
    /// Non-blog content of the space, any status.
    pub pages: Vec<Page>,
    pub blog_posts: Vec<Page>,
    pub pages_fetched: bool,
}

impl Space {
    pub fn new(key: impl Into<String>, name: Option<String>, access: SpaceAccess) -> Self {
        Self {
            key: key.into(),
            name,
            access,
            pages: Vec::new(),
            blog_posts: Vec::new(),
            pages_fetched: false,
        }
    }

    pub fn display_title(&self) -> String {
        match self.name.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => format!("{}: {name}", self.key),
            None => self.key.clone(),
        }
    }

    pub fn pages_with_status<'a>(&'a self, status: &PageStatus) -> Vec<&'a Page> {
        self.pages
            .iter()
            .filter(|page| page.status == *status)
            .collect()
    }

    pub fn current_pages(&self) -> Vec<&Page> {
        self.pages_with_status(&PageStatus::Current)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.pages
            .iter()
            .chain(self.blog_posts.iter())
            .filter_map(Page::last_modified)
            .max()
    }

    /// Number of current pages below each current page in the parent tree.
    pub fn descendant_counts(&self) -> BTreeMap<String, usize> {
        let current = self.current_pages();
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for page in &current {
            if let Some(parent) = page.parent_id.as_deref() {
                children.entry(parent).or_default().push(page.id.as_str());
            }
        }

        let mut counts = BTreeMap::new();
        for page in &current {
            let mut total = 0usize;
            let mut stack = vec![page.id.as_str()];
            let mut visited = BTreeSet::from([page.id.as_str()]);
            while let Some(id) = stack.pop() {
                for child in children.get(id).into_iter().flatten() {
                    if visited.insert(*child) {
                        total += 1;
                        stack.push(*child);
                    }
                }
            }
            counts.insert(page.id.clone(), total);
        }
        counts
    }

    /// Read restriction of every page, following parent links upwards.
    pub fn read_restrictions(&self) -> BTreeMap<String, ReadRestriction> {
        let by_id: BTreeMap<&str, &Page> = self
            .pages
            .iter()
            .map(|page| (page.id.as_str(), page))
            .collect();

        let mut states = BTreeMap::new();
        for page in self.pages.iter().chain(self.blog_posts.iter()) {
            let state = if page.has_own_restrictions() {
                ReadRestriction::Restricted
            } else {
                let mut visited = BTreeSet::from([page.id.as_str()]);
                let mut parent = page.parent_id.as_deref();
                let mut inherited = false;
                while let Some(id) = parent.filter(|id| visited.insert(*id)) {
                    let Some(ancestor) = by_id.get(id) else {
                        break;
                    };
                    if ancestor.has_own_restrictions() {
                        inherited = true;
                        break;
                    }
                    parent = ancestor.parent_id.as_deref();
                }
                if inherited {
                    ReadRestriction::Inherited
                } else {
                    ReadRestriction::Open
                }
            };
            states.insert(page.id.clone(), state);
        }
        states
    }

    /// Current pages that are restricted themselves or below a restricted page.
    pub fn restricted_count(&self) -> usize {
        let states = self.read_restrictions();
        self.current_pages()
            .iter()
            .filter(|page| {
                states
                    .get(&page.id)
                    .is_some_and(|state| *state != ReadRestriction::Open)
            })
            .count()
    }

    fn push(&mut self, page: Page) {
        match page.kind {
            ContentKind::Page => self.pages.push(page),
            ContentKind::BlogPost => self.blog_posts.push(page),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePlacement {
    Assigned,
    Unassigned,
    Duplicate,
}

/// Everything one crawl learned, keyed by space key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub spaces: BTreeMap<String, Space>,
    /// Pages whose space key matched no crawled space.
    pub unassigned: Vec<Page>,
    seen_pages: BTreeSet<String>,
}

impl CrawlResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a space with the same key is already present.
    pub fn insert_space(&mut self, space: Space) -> bool {
        if self.spaces.contains_key(&space.key) {
            return false;
        }
        self.spaces.insert(space.key.clone(), space);
        true
    }

    pub fn space(&self, key: &str) -> Option<&Space> {
        self.spaces.get(key)
    }

    pub fn mark_pages_fetched(&mut self, key: &str) {
        if let Some(space) = self.spaces.get_mut(key) {
            space.pages_fetched = true;
        }
    }

    pub fn has_page(&self, id: &str) -> bool {
        !id.is_empty() && self.seen_pages.contains(id)
    }

    pub fn add_page(&mut self, page: Page) -> PagePlacement {
        if !page.id.is_empty() && !self.seen_pages.insert(page.id.clone()) {
            return PagePlacement::Duplicate;
        }
        match self.spaces.get_mut(&page.space_key) {
            Some(space) => {
                space.push(page);
                PagePlacement::Assigned
            }
            None => {
                self.unassigned.push(page);
                PagePlacement::Unassigned
            }
        }
    }

    pub fn page_count(&self) -> usize {
        self.spaces
            .values()
            .map(|space| space.pages.len() + space.blog_posts.len())
            .sum::<usize>()
            + self.unassigned.len()
    }
}
