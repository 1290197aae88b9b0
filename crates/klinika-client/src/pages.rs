//! Per-resource pages composing the API service, table and forms

use crate::api::{ApiService, Endpoints, ResourceApi};
use crate::error::{ClientError, ClientResult};
use crate::form::{CreateForm, EditForm};
use crate::schema::{Field, SelectOption};
use crate::table::{Confirm, DeleteOutcome, Table, TableConfig};
use indexmap::IndexMap;
use klinika_core::{
    Resource,
    types::{
        Block, HelpCenter, HelpCenterCategory, Reservation, Role, ServiceDesk, Specialization,
        User,
    },
};
use std::sync::Arc;
use tracing::warn;

/// Reference endpoint filling the choices of a select field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSource {
    /// Select field identifier
    pub field: &'static str,
    /// Endpoint path listing the referenced records
    pub endpoint: String,
    /// Record field used as the option label
    pub label_field: &'static str,
}

impl OptionSource {
    fn all_of(field: &'static str, resource: &str, label_field: &'static str) -> Self {
        Self {
            field,
            endpoint: format!("{resource}/getAll"),
            label_field,
        }
    }
}

/// Static description of a resource page
#[derive(Debug, Clone, PartialEq)]
pub struct PageDefinition {
    /// Route segment of the resource
    pub resource: &'static str,
    /// Human title
    pub title: &'static str,
    /// Column titles
    pub headers: Vec<&'static str>,
    /// Record fields, one per column
    pub data_fields: Vec<&'static str>,
    /// Create form inputs
    pub fields: Vec<Field>,
    /// Edit form inputs
    pub edit_fields: Vec<Field>,
    /// Reference endpoints for select inputs
    pub option_sources: Vec<OptionSource>,
}

impl PageDefinition {
    /// Endpoints of this resource plus its reference endpoints
    #[must_use]
    pub fn endpoints(&self) -> Endpoints {
        self.option_sources
            .iter()
            .fold(Endpoints::standard(self.resource), |endpoints, source| {
                endpoints.with_options(source.field, source.endpoint.clone())
            })
    }

    /// Table layout showing `page_size` rows
    #[must_use]
    pub fn table_config(&self, page_size: u32) -> TableConfig {
        TableConfig::new(
            self.headers.iter().copied(),
            self.data_fields.iter().copied(),
            page_size,
        )
    }

    /// Create form inputs, or edit form inputs when `editing`
    #[must_use]
    pub fn form_fields(&self, editing: bool) -> &[Field] {
        if editing { &self.edit_fields } else { &self.fields }
    }
}

/// A resource with a page definition
pub trait PageResource: Resource {
    /// Headers, fields and references of this resource's page
    fn definition() -> PageDefinition;
}

fn category_like(resource: &'static str, title: &'static str) -> PageDefinition {
    let fields = vec![
        Field::text("name", "Name")
            .placeholder("Enter a name")
            .max_length(100),
        Field::text("createdBy", "Created by").max_length(256),
    ];
    PageDefinition {
        resource,
        title,
        headers: vec!["Name", "Created by", "Created"],
        data_fields: vec!["name", "createdBy", "creationDate"],
        edit_fields: fields.clone(),
        fields,
        option_sources: Vec::new(),
    }
}

impl PageResource for HelpCenterCategory {
    fn definition() -> PageDefinition {
        category_like(Self::NAME, "Help center categories")
    }
}

impl PageResource for Specialization {
    fn definition() -> PageDefinition {
        category_like(Self::NAME, "Specializations")
    }
}

impl PageResource for HelpCenter {
    fn definition() -> PageDefinition {
        let fields = vec![
            Field::text("name", "Name")
                .placeholder("Enter your name")
                .max_length(100),
            Field::email("email", "Email")
                .placeholder("Enter your email")
                .max_length(100),
            Field::text("subject", "Subject")
                .placeholder("Enter the subject")
                .max_length(255),
            Field::textarea("message", "Message")
                .placeholder("Enter your message")
                .max_length(5000),
            Field::select("categoryId", "Category", Vec::new()),
        ];
        PageDefinition {
            resource: Self::NAME,
            title: "Help center",
            headers: vec!["Name", "Email", "Subject", "Message", "Created"],
            data_fields: vec!["name", "email", "subject", "message", "creationDate"],
            edit_fields: fields.clone(),
            fields,
            option_sources: vec![OptionSource::all_of(
                "categoryId",
                HelpCenterCategory::NAME,
                "name",
            )],
        }
    }
}

impl PageResource for Block {
    fn definition() -> PageDefinition {
        let fields = vec![
            Field::text("name", "Name").max_length(100),
            Field::select("parentBlockId", "Parent block", Vec::new()).optional(),
            Field::select("specializationId", "Specialization", Vec::new()),
        ];
        PageDefinition {
            resource: Self::NAME,
            title: "Blocks",
            headers: vec!["Name", "Parent block", "Specialization"],
            data_fields: vec!["name", "parentBlockId", "specializationId"],
            edit_fields: fields.clone(),
            fields,
            option_sources: vec![
                OptionSource::all_of("parentBlockId", Self::NAME, "name"),
                OptionSource::all_of("specializationId", Specialization::NAME, "name"),
            ],
        }
    }
}

impl PageResource for ServiceDesk {
    fn definition() -> PageDefinition {
        let fields = vec![
            Field::text("name", "Name").max_length(100),
            Field::email("email", "Email").max_length(100),
            Field::text("operatingHours", "Operating hours")
                .placeholder("Mon-Fri 08:00-16:00")
                .max_length(100),
            Field::select("blockId", "Block", Vec::new()),
        ];
        PageDefinition {
            resource: Self::NAME,
            title: "Service desks",
            headers: vec!["Name", "Email", "Operating hours", "Block"],
            data_fields: vec!["name", "email", "operatingHours", "blockId"],
            edit_fields: fields.clone(),
            fields,
            option_sources: vec![OptionSource::all_of("blockId", Block::NAME, "name")],
        }
    }
}

fn role_options() -> Vec<SelectOption> {
    Role::ALL
        .into_iter()
        .map(|role| SelectOption::new(role.as_str(), role.as_str()))
        .collect()
}

impl PageResource for User {
    fn definition() -> PageDefinition {
        let profile = vec![
            Field::email("email", "Email").max_length(256),
            Field::text("firstName", "First name").max_length(50),
            Field::text("lastName", "Last name").max_length(50),
            Field::text("gender", "Gender").max_length(50),
            Field::text("birthDate", "Birth date").placeholder("YYYY-MM-DD"),
            Field::select("role", "Role", role_options()),
            Field::select("specializationId", "Specialization", Vec::new()).optional(),
            Field::select("serviceDeskId", "Service desk", Vec::new()).optional(),
        ];
        let mut fields = profile.clone();
        fields.push(Field::password("password", "Password").max_length(255));
        let mut edit_fields = profile;
        edit_fields.push(
            Field::password("password", "New password")
                .placeholder("Leave empty to keep the current password")
                .max_length(255)
                .optional(),
        );

        PageDefinition {
            resource: Self::NAME,
            title: "Users",
            headers: vec!["Email", "First name", "Last name", "Gender", "Birth date", "Role"],
            data_fields: vec!["email", "firstName", "lastName", "gender", "birthDate", "role"],
            fields,
            edit_fields,
            option_sources: vec![
                OptionSource::all_of("specializationId", Specialization::NAME, "name"),
                OptionSource::all_of("serviceDeskId", ServiceDesk::NAME, "name"),
            ],
        }
    }
}

impl PageResource for Reservation {
    fn definition() -> PageDefinition {
        let fields = vec![
            Field::select("patientId", "Patient", Vec::new()),
            Field::select("specializationId", "Specialization", Vec::new()),
            Field::select("doctorId", "Doctor", Vec::new()).optional(),
            Field::textarea("reasonOfConsult", "Reason of consult").max_length(2000),
            Field::text("appointmentDate", "Appointment date")
                .placeholder("YYYY-MM-DDTHH:MM:SSZ"),
        ];
        PageDefinition {
            resource: Self::NAME,
            title: "Reservations",
            headers: vec!["Patient", "Specialization", "Doctor", "Reason", "Appointment", "Created"],
            data_fields: vec![
                "patientId",
                "specializationId",
                "doctorId",
                "reasonOfConsult",
                "appointmentDate",
                "creationDate",
            ],
            edit_fields: fields.clone(),
            fields,
            option_sources: vec![
                OptionSource::all_of("patientId", User::NAME, "email"),
                OptionSource::all_of("specializationId", Specialization::NAME, "name"),
                OptionSource::all_of("doctorId", User::NAME, "email"),
            ],
        }
    }
}

/// Every page definition, in navigation order
#[must_use]
pub fn all_definitions() -> Vec<PageDefinition> {
    vec![
        HelpCenter::definition(),
        HelpCenterCategory::definition(),
        Specialization::definition(),
        Block::definition(),
        ServiceDesk::definition(),
        User::definition(),
        Reservation::definition(),
    ]
}

/// Page definition of the resource named `resource`, case-insensitive
#[must_use]
pub fn definition_for(resource: &str) -> Option<PageDefinition> {
    all_definitions()
        .into_iter()
        .find(|definition| definition.resource.eq_ignore_ascii_case(resource))
}

/// One resource's page: its table, modals and loaded select choices
///
/// All state lives here; two pages never share selection or modal flags.
pub struct ResourcePage<R: PageResource, A: ResourceApi<R> + ?Sized> {
    definition: PageDefinition,
    api: Arc<A>,
    table: Table<R, A>,
    create: Option<CreateForm<R, A>>,
    edit: Option<EditForm<R, A>>,
    options: IndexMap<String, Vec<SelectOption>>,
}

impl<R: PageResource, A: ResourceApi<R> + ?Sized> std::fmt::Debug for ResourcePage<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePage")
            .field("resource", &self.definition.resource)
            .field("table", &self.table)
            .field("create_open", &self.create.is_some())
            .field("edit_open", &self.edit.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: PageResource> ResourcePage<R, ApiService<R>> {
    /// Page talking HTTP to the API rooted at `base_url`
    pub fn connect(base_url: impl Into<String>, page_size: u32) -> Self {
        let api = ApiService::new(base_url, R::definition().endpoints());
        Self::new(Arc::new(api), page_size)
    }
}

impl<R: PageResource, A: ResourceApi<R> + ?Sized> ResourcePage<R, A> {
    /// Page over `api` showing `page_size` rows
    pub fn new(api: Arc<A>, page_size: u32) -> Self {
        let definition = R::definition();
        let table = Table::new(Arc::clone(&api), definition.table_config(page_size));
        Self {
            definition,
            api,
            table,
            create: None,
            edit: None,
            options: IndexMap::new(),
        }
    }

    /// Static description
    #[must_use]
    pub const fn definition(&self) -> &PageDefinition {
        &self.definition
    }

    /// The list view
    #[must_use]
    pub const fn table(&self) -> &Table<R, A> {
        &self.table
    }

    /// The list view, for paging, searching and selecting
    pub const fn table_mut(&mut self) -> &mut Table<R, A> {
        &mut self.table
    }

    /// Fetch the first view of the table
    ///
    /// # Errors
    ///
    /// Returns the request error.
    pub async fn load(&mut self) -> ClientResult<()> {
        self.table.refetch().await
    }

    /// Fetch the choices of every referenced select field
    ///
    /// # Errors
    ///
    /// Returns the first failing request; choices loaded before it are kept.
    pub async fn load_options(&mut self) -> ClientResult<()> {
        for source in &self.definition.option_sources {
            let records = self.api.options(source.field).await?;
            let choices = records
                .iter()
                .filter_map(|record| SelectOption::from_record(record, source.label_field))
                .collect();
            self.options.insert(source.field.to_string(), choices);
        }
        Ok(())
    }

    /// Loaded choices of `field`
    #[must_use]
    pub fn options(&self, field: &str) -> Option<&[SelectOption]> {
        self.options.get(field).map(Vec::as_slice)
    }

    fn resolved_fields(&self, editing: bool) -> Vec<Field> {
        self.definition
            .form_fields(editing)
            .iter()
            .cloned()
            .map(|mut field| {
                if let Some(choices) = self.options.get(&field.identifier) {
                    field.set_options(choices.clone());
                }
                field
            })
            .collect()
    }

    async fn refresh(&mut self) {
        if let Err(err) = self.table.refetch().await {
            warn!("Refetch after save failed: {}", err);
        }
    }

    /// Open the create modal after loading select choices
    ///
    /// The modal opens even when choices fail to load; its selects then
    /// have nothing to choose from and the form cannot validate.
    ///
    /// # Errors
    ///
    /// Returns the choice loading error.
    pub async fn open_create(&mut self) -> ClientResult<()> {
        let loaded = self.load_options().await;
        let fields = self.resolved_fields(false);
        self.create = Some(CreateForm::new(
            Arc::clone(&self.api),
            self.definition.title,
            fields,
        ));
        loaded
    }

    /// The open create form
    pub fn create_form(&mut self) -> Option<&mut CreateForm<R, A>> {
        self.create.as_mut()
    }

    /// Submit the create form; on success close it and refetch the table
    ///
    /// # Errors
    ///
    /// Returns an error when no create form is open, or the submission error.
    pub async fn submit_create(&mut self) -> ClientResult<R> {
        let form = self
            .create
            .as_mut()
            .ok_or_else(|| ClientError::configuration("create form is not open"))?;
        let record = form.submit().await?;
        self.create = None;
        self.refresh().await;
        Ok(record)
    }

    /// Close the create modal without saving
    pub fn close_create(&mut self) {
        self.create = None;
    }

    /// Mark `id` for editing and open the edit modal with the fetched record
    ///
    /// # Errors
    ///
    /// Returns the choice loading error.
    pub async fn open_edit(&mut self, id: R::Id) -> ClientResult<()> {
        self.table.edit(id);
        let loaded = self.load_options().await;
        let fields = self.resolved_fields(true);
        let form = EditForm::open(Arc::clone(&self.api), self.definition.title, fields, id).await;
        self.edit = Some(form);
        loaded
    }

    /// The open edit form
    pub fn edit_form(&mut self) -> Option<&mut EditForm<R, A>> {
        self.edit.as_mut()
    }

    /// Submit the edit form; on success close it and refetch the table
    ///
    /// # Errors
    ///
    /// Returns an error when no edit form is open, or the submission error.
    pub async fn submit_edit(&mut self) -> ClientResult<R> {
        let form = self
            .edit
            .as_mut()
            .ok_or_else(|| ClientError::configuration("edit form is not open"))?;
        let record = form.submit().await?;
        self.close_edit();
        self.refresh().await;
        Ok(record)
    }

    /// Close the edit modal without saving
    pub fn close_edit(&mut self) {
        self.edit = None;
        self.table.close_edit();
    }

    /// Delete one row after confirmation
    ///
    /// # Errors
    ///
    /// Returns the delete or refetch error.
    pub async fn delete(&mut self, id: R::Id, confirm: &impl Confirm) -> ClientResult<DeleteOutcome> {
        self.table.delete(id, confirm).await
    }

    /// Delete the selected rows after confirmation
    ///
    /// # Errors
    ///
    /// Returns the bulk delete or refetch error.
    pub async fn delete_selected(&mut self, confirm: &impl Confirm) -> ClientResult<DeleteOutcome> {
        self.table.bulk_delete_selected(confirm).await
    }
}
