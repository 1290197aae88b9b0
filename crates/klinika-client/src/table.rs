//! Paginated, multi-select list view bound to one resource type

use crate::api::ResourceApi;
use crate::error::{ClientError, ClientResult};
use klinika_core::{
    Resource,
    utils::{format_date_value, is_date_field},
};
use serde_json::Value;
use std::{collections::BTreeSet, marker::PhantomData, sync::Arc};
use tracing::{debug, warn};

/// Prompt shown before deleting a single row
pub const DELETE_PROMPT: &str = "Are you sure? You won't be able to revert this!";

/// Asks the user to confirm a destructive action
pub trait Confirm {
    /// Whether the user agreed to `prompt`
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Columns, headers and paging of a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Column titles, one per data field
    pub headers: Vec<String>,
    /// Record fields shown, in column order
    pub data_fields: Vec<String>,
    /// Rows per page
    pub page_size: u32,
    /// Show the edit column
    pub editable: bool,
    /// Show the remove column
    pub removable: bool,
}

impl TableConfig {
    /// Editable, removable table of `page_size` rows
    pub fn new<H, F>(headers: H, data_fields: F, page_size: u32) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            data_fields: data_fields.into_iter().map(Into::into).collect(),
            page_size,
            editable: true,
            removable: true,
        }
    }
}

/// One rendered column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// Row selection checkbox; the header toggles the visible rows
    Select,
    /// A record field
    Data {
        /// Column title
        header: String,
        /// Record field
        field: String,
    },
    /// Edit button
    Edit,
    /// Remove button
    Remove,
}

/// Loading placeholder with the table's shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Skeleton {
    /// Same count as the loaded table
    pub columns: usize,
    /// Placeholder rows
    pub rows: usize,
}

/// Fetch state of the current page
#[derive(Debug, Clone, PartialEq)]
pub enum TableState<R> {
    /// A request is in flight or the last one failed
    Loading,
    /// Rows of the current page
    Loaded {
        /// Records on this page
        rows: Vec<R>,
        /// Pages for the current search
        total_pages: u32,
        /// Records matching the current search
        total_count: u64,
    },
}

/// A record rendered for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow<I> {
    /// Record id
    pub id: I,
    /// Whether the row checkbox is checked
    pub selected: bool,
    /// One cell per data field
    pub cells: Vec<String>,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Rows were deleted and the table refetched
    Deleted(u64),
    /// The user declined; nothing changed
    Cancelled,
}

/// Render one field of a serialized record
///
/// Missing and null values render empty; date fields render as `Mon DD, YYYY`.
#[must_use]
pub fn render_cell(record: &Value, field: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) if is_date_field(field) => {
            format_date_value(s).unwrap_or_else(|| s.clone())
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// List view over one resource
///
/// Owns its page cursor, search term, selection and edit target; nothing is
/// shared between tables.
pub struct Table<R: Resource, A: ResourceApi<R> + ?Sized> {
    api: Arc<A>,
    config: TableConfig,
    state: TableState<R>,
    page: u32,
    search: String,
    selection: BTreeSet<R::Id>,
    editing: Option<R::Id>,
    last_error: Option<String>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> std::fmt::Debug for Table<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("resource", &R::NAME)
            .field("page", &self.page)
            .field("search", &self.search)
            .field("selection", &self.selection)
            .field("editing", &self.editing)
            .finish_non_exhaustive()
    }
}

impl<R: Resource, A: ResourceApi<R> + ?Sized> Table<R, A> {
    /// Create a table on page 1; nothing is fetched until [`Table::refetch`]
    pub fn new(api: Arc<A>, config: TableConfig) -> Self {
        Self {
            api,
            config,
            state: TableState::Loading,
            page: 1,
            search: String::new(),
            selection: BTreeSet::new(),
            editing: None,
            last_error: None,
            _resource: PhantomData,
        }
    }

    /// Fetch the current page with the current search
    ///
    /// # Errors
    ///
    /// Returns the request error; the table stays in the loading state and
    /// remembers the message.
    pub async fn refetch(&mut self) -> ClientResult<()> {
        self.state = TableState::Loading;
        debug!(
            "Fetching {} page {} (search '{}')",
            R::NAME,
            self.page,
            self.search
        );

        match self
            .api
            .paginate(self.page, self.config.page_size, &self.search)
            .await
        {
            Ok(page) => {
                self.last_error = None;
                self.state = TableState::Loaded {
                    rows: page.data,
                    total_pages: page.total_pages,
                    total_count: page.total_count,
                };
                Ok(())
            }
            Err(err) => {
                warn!("Failed to fetch {}: {}", R::NAME, err);
                self.last_error = Some(err.display_message());
                Err(err)
            }
        }
    }

    /// Move to page `page` and refetch
    ///
    /// # Errors
    ///
    /// Returns a validation error for page 0, or the request error.
    pub async fn set_page(&mut self, page: u32) -> ClientResult<()> {
        if page == 0 {
            return Err(ClientError::field("page", "page must be at least 1"));
        }
        self.page = page;
        self.refetch().await
    }

    /// Filter by `term`, back on page 1, and refetch
    ///
    /// # Errors
    ///
    /// Returns the request error.
    pub async fn set_search(&mut self, term: impl Into<String>) -> ClientResult<()> {
        self.search = term.into();
        self.page = 1;
        self.refetch().await
    }

    /// Current page number
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Current search term
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Fetch state
    #[must_use]
    pub const fn state(&self) -> &TableState<R> {
        &self.state
    }

    /// Whether the table shows its skeleton
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, TableState::Loading)
    }

    /// Message of the last failed request
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Total pages for the current search, 0 while loading
    #[must_use]
    pub const fn total_pages(&self) -> u32 {
        match &self.state {
            TableState::Loaded { total_pages, .. } => *total_pages,
            TableState::Loading => 0,
        }
    }

    /// Column layout: select, data fields, then edit and remove when enabled
    #[must_use]
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = vec![Column::Select];
        columns.extend(
            self.config
                .data_fields
                .iter()
                .enumerate()
                .map(|(i, field)| Column::Data {
                    header: self.config.headers.get(i).cloned().unwrap_or_else(|| field.clone()),
                    field: field.clone(),
                }),
        );
        if self.config.editable {
            columns.push(Column::Edit);
        }
        if self.config.removable {
            columns.push(Column::Remove);
        }
        columns
    }

    /// Placeholder shown while loading, with the loaded column count
    #[must_use]
    pub fn skeleton(&self) -> Option<Skeleton> {
        self.is_loading().then(|| Skeleton {
            columns: self.columns().len(),
            rows: self.config.page_size as usize,
        })
    }

    /// Records on the current page; empty while loading
    #[must_use]
    pub fn records(&self) -> &[R] {
        match &self.state {
            TableState::Loaded { rows, .. } => rows,
            TableState::Loading => &[],
        }
    }

    /// Ids of the rows on the current page
    #[must_use]
    pub fn visible_ids(&self) -> Vec<R::Id> {
        self.records().iter().map(|record| record.id()).collect()
    }

    /// Rows of the current page rendered cell by cell
    #[must_use]
    pub fn rows(&self) -> Vec<RenderedRow<R::Id>> {
        self.records()
            .iter()
            .map(|record| {
                let value = serde_json::to_value(record).unwrap_or(Value::Null);
                RenderedRow {
                    id: record.id(),
                    selected: self.selection.contains(&record.id()),
                    cells: self
                        .config
                        .data_fields
                        .iter()
                        .map(|field| render_cell(&value, field))
                        .collect(),
                }
            })
            .collect()
    }

    /// Flip one row's checkbox, returning its new state
    pub fn toggle_row(&mut self, id: R::Id) -> bool {
        if self.selection.remove(&id) {
            false
        } else {
            self.selection.insert(id);
            true
        }
    }

    /// Whether `id` is selected
    #[must_use]
    pub fn is_selected(&self, id: R::Id) -> bool {
        self.selection.contains(&id)
    }

    /// Header checkbox: check or uncheck exactly the rows on this page
    pub fn toggle_all_visible(&mut self, checked: bool) {
        for id in self.visible_ids() {
            if checked {
                self.selection.insert(id);
            } else {
                self.selection.remove(&id);
            }
        }
    }

    /// Header checkbox state: every visible row is selected
    #[must_use]
    pub fn all_visible_selected(&self) -> bool {
        let visible = self.visible_ids();
        !visible.is_empty() && visible.iter().all(|id| self.selection.contains(id))
    }

    /// Selected ids across all pages
    #[must_use]
    pub fn selected(&self) -> Vec<R::Id> {
        self.selection.iter().copied().collect()
    }

    /// Uncheck every row
    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Remember `id` as the edit target; the edit form fetches it
    pub fn edit(&mut self, id: R::Id) {
        self.editing = Some(id);
    }

    /// Record being edited, if any
    #[must_use]
    pub const fn editing(&self) -> Option<R::Id> {
        self.editing
    }

    /// Forget the edit target
    pub fn close_edit(&mut self) {
        self.editing = None;
    }

    /// Delete one row after confirmation, then refetch
    ///
    /// # Errors
    ///
    /// Returns the delete error, with no change to the table, or the refetch error.
    pub async fn delete(&mut self, id: R::Id, confirm: &impl Confirm) -> ClientResult<DeleteOutcome> {
        if !confirm.confirm(DELETE_PROMPT) {
            return Ok(DeleteOutcome::Cancelled);
        }

        let deleted = match self.api.delete(id).await {
            Ok(deleted) => deleted,
            Err(err) => {
                self.last_error = Some(err.display_message());
                return Err(err);
            }
        };
        self.selection.remove(&id);
        self.refetch().await?;
        Ok(DeleteOutcome::Deleted(deleted))
    }

    /// Delete every selected row after confirmation, then clear the selection and refetch
    ///
    /// Does nothing when no row is selected.
    ///
    /// # Errors
    ///
    /// Returns the bulk delete error, with the selection kept, or the refetch error.
    pub async fn bulk_delete_selected(&mut self, confirm: &impl Confirm) -> ClientResult<DeleteOutcome> {
        if self.selection.is_empty() {
            return Ok(DeleteOutcome::Deleted(0));
        }
        let prompt = format!("Delete {} selected item(s)?", self.selection.len());
        if !confirm.confirm(&prompt) {
            return Ok(DeleteOutcome::Cancelled);
        }

        let ids = self.selected();
        let deleted = match self.api.bulk_delete(&ids).await {
            Ok(deleted) => deleted,
            Err(err) => {
                self.last_error = Some(err.display_message());
                return Err(err);
            }
        };
        self.selection.clear();
        self.refetch().await?;
        Ok(DeleteOutcome::Deleted(deleted))
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use crate::mock::MockResourceApi;
    use chrono::{TimeZone, Utc};
    use klinika_core::types::HelpCenter;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn ticket(id: i32) -> HelpCenter {
        HelpCenter {
            id,
            name: format!("Ann {id}"),
            email: "a@b.com".to_string(),
            subject: format!("Subject {id}"),
            message: "M".to_string(),
            creation_date: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
            category_id: 1,
        }
    }

    fn table(count: i32) -> (Arc<MockResourceApi<HelpCenter>>, Table<HelpCenter, MockResourceApi<HelpCenter>>) {
        let api = Arc::new(MockResourceApi::with_records((1..=count).map(ticket)));
        let config = TableConfig::new(
            ["Name", "Subject", "Created"],
            ["name", "subject", "creationDate"],
            10,
        );
        (Arc::clone(&api), Table::new(api, config))
    }

    const fn yes(_: &str) -> bool {
        true
    }

    const fn no(_: &str) -> bool {
        false
    }

    #[test]
    fn test_render_cell() {
        let record = json!({
            "name": "Ann",
            "categoryId": 3,
            "creationDate": "2024-03-05T10:00:00Z",
            "birthDate": "1990-05-01",
            "parentBlockId": null
        });
        assert_eq!(render_cell(&record, "name"), "Ann");
        assert_eq!(render_cell(&record, "categoryId"), "3");
        assert_eq!(render_cell(&record, "creationDate"), "Mar 05, 2024");
        assert_eq!(render_cell(&record, "birthDate"), "May 01, 1990");
        assert_eq!(render_cell(&record, "parentBlockId"), "");
        assert_eq!(render_cell(&record, "missing"), "");
    }

    #[tokio::test]
    async fn test_loading_then_loaded() {
        let (_, mut table) = table(25);
        assert!(table.is_loading());
        assert_eq!(table.skeleton(), Some(Skeleton { columns: 6, rows: 10 }));

        table.refetch().await.unwrap();
        assert!(table.skeleton().is_none());
        assert_eq!(table.rows().len(), 10);
        assert_eq!(table.total_pages(), 3);
        assert_eq!(table.columns().len(), 6);

        let first = &table.rows()[0];
        assert_eq!(first.cells, vec!["Ann 1", "Subject 1", "Mar 05, 2024"]);
    }

    #[tokio::test]
    async fn test_failed_fetch_stays_loading() {
        let (api, mut table) = table(3);
        api.set_failure(Some("down"));
        assert!(table.refetch().await.is_err());
        assert!(table.is_loading());
        assert_eq!(table.last_error(), Some("down"));
    }

    #[tokio::test]
    async fn test_search_resets_page() {
        let (_, mut table) = table(25);
        table.set_page(3).await.unwrap();
        assert_eq!(table.rows().len(), 5);

        table.set_search("subject 2").await.unwrap();
        assert_eq!(table.page(), 1);
        // "Subject 2" and "Subject 20".."Subject 25"
        assert_eq!(table.rows().len(), 7);
    }

    #[tokio::test]
    async fn test_header_toggle_only_touches_visible_rows() {
        let (_, mut table) = table(25);
        table.refetch().await.unwrap();
        table.toggle_all_visible(true);
        assert!(table.all_visible_selected());

        table.set_page(2).await.unwrap();
        assert!(!table.all_visible_selected());
        table.toggle_row(11);
        table.toggle_all_visible(false);

        assert_eq!(table.selected(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let (api, mut table) = table(3);
        table.refetch().await.unwrap();
        let calls = api.calls();

        assert_eq!(table.delete(2, &no).await.unwrap(), DeleteOutcome::Cancelled);
        assert_eq!(api.calls(), calls);
        assert_eq!(api.records().len(), 3);

        table.toggle_row(2);
        assert_eq!(table.delete(2, &yes).await.unwrap(), DeleteOutcome::Deleted(1));
        assert_eq!(table.visible_ids(), vec![1, 3]);
        assert!(!table.is_selected(2));

        let err = table.delete(2, &yes).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(table.visible_ids(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_edit_does_not_fetch() {
        let (api, mut table) = table(3);
        table.refetch().await.unwrap();
        let calls = api.calls();

        table.edit(2);
        assert_eq!(table.editing(), Some(2));
        assert_eq!(api.calls(), calls);

        table.close_edit();
        assert_eq!(table.editing(), None);
    }

    #[tokio::test]
    async fn test_bulk_delete_selected() {
        let (api, mut table) = table(5);
        table.refetch().await.unwrap();
        table.toggle_row(1);
        table.toggle_row(4);

        assert_eq!(
            table.bulk_delete_selected(&yes).await.unwrap(),
            DeleteOutcome::Deleted(2)
        );
        assert!(table.selected().is_empty());
        assert_eq!(table.visible_ids(), vec![2, 3, 5]);
        assert_eq!(api.records().len(), 3);

        let calls = api.calls();
        assert_eq!(table.bulk_delete_selected(&yes).await.unwrap(), DeleteOutcome::Deleted(0));
        assert_eq!(api.calls(), calls);
    }

    proptest! {
        #[test]
        fn prop_header_toggle_selects_exactly_visible(
            count in 0_i32..40,
            page in 1_u32..5,
            preselected in proptest::collection::btree_set(1_i32..40, 0..6),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let (_, mut table) = table(count);
                for id in &preselected {
                    table.toggle_row(*id);
                }
                table.set_page(page).await.unwrap();
                let visible: BTreeSet<i32> = table.visible_ids().into_iter().collect();

                table.toggle_all_visible(true);
                let after_check: BTreeSet<i32> = table.selected().into_iter().collect();
                let expected: BTreeSet<i32> = preselected.union(&visible).copied().collect();
                assert_eq!(after_check, expected);

                table.toggle_all_visible(false);
                let after_clear: BTreeSet<i32> = table.selected().into_iter().collect();
                let expected: BTreeSet<i32> = preselected.difference(&visible).copied().collect();
                assert_eq!(after_clear, expected);
                assert!(visible.len() <= 10);
            });
        }
    }
}
