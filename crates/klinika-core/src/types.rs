//! Core data types for Klinika
//!
//! Every entity comes with a payload type carrying the declarative validation
//! rules applied on create and update. Records serialize with camelCase keys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    Error, Result,
    resource::{Reference, Resource},
    utils,
};

/// Table names shared by the stores and the migrations
pub mod tables {
    /// Help-center ticket categories
    pub const HELP_CENTER_CATEGORIES: &str = "help_center_categories";
    /// Help-center tickets
    pub const HELP_CENTERS: &str = "help_centers";
    /// Medical specializations
    pub const SPECIALIZATIONS: &str = "specializations";
    /// Building blocks
    pub const BLOCKS: &str = "blocks";
    /// Service desks
    pub const SERVICE_DESKS: &str = "service_desks";
    /// User accounts
    pub const USERS: &str = "users";
    /// Consultation reservations
    pub const RESERVATIONS: &str = "reservations";
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message(Cow::Borrowed("must not be blank")));
    }
    Ok(())
}

/// Help-center ticket category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpCenterCategory {
    /// Identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Who created the category
    pub created_by: String,
    /// When the category was created
    pub creation_date: DateTime<Utc>,
}

/// Create/update body for [`HelpCenterCategory`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HelpCenterCategoryPayload {
    /// Display name
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Who created the category
    #[validate(length(min = 1, max = 256), custom(function = "not_blank"))]
    pub created_by: String,
}

impl Resource for HelpCenterCategory {
    type Id = i32;
    type Payload = HelpCenterCategoryPayload;

    const NAME: &'static str = "HelpCenterCategory";
    const TABLE: &'static str = tables::HELP_CENTER_CATEGORIES;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id,
            name: payload.name,
            created_by: payload.created_by,
            creation_date: now,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        self.name = payload.name;
        self.created_by = payload.created_by;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.created_by.as_str()]
    }
}

/// Help-center ticket submitted by a visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpCenter {
    /// Identifier
    pub id: i32,
    /// Sender name
    pub name: String,
    /// Sender email
    pub email: String,
    /// Ticket subject
    pub subject: String,
    /// Ticket body
    pub message: String,
    /// When the ticket was submitted
    pub creation_date: DateTime<Utc>,
    /// Category the ticket belongs to
    pub category_id: i32,
}

/// Create/update body for [`HelpCenter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HelpCenterPayload {
    /// Sender name
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Sender email
    #[validate(email, length(max = 100))]
    pub email: String,
    /// Ticket subject
    #[validate(length(min = 1, max = 255), custom(function = "not_blank"))]
    pub subject: String,
    /// Ticket body
    #[validate(length(min = 1, max = 5000), custom(function = "not_blank"))]
    pub message: String,
    /// Category the ticket belongs to
    #[validate(range(min = 1))]
    pub category_id: i32,
}

impl Resource for HelpCenter {
    type Id = i32;
    type Payload = HelpCenterPayload;

    const NAME: &'static str = "HelpCenter";
    const TABLE: &'static str = tables::HELP_CENTERS;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id,
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            message: payload.message,
            creation_date: now,
            category_id: payload.category_id,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        self.name = payload.name;
        self.email = payload.email;
        self.subject = payload.subject;
        self.message = payload.message;
        self.category_id = payload.category_id;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.email.as_str(), self.subject.as_str(), self.message.as_str()]
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::to(
            "categoryId",
            tables::HELP_CENTER_CATEGORIES,
            self.category_id,
        )]
    }
}

/// Medical specialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialization {
    /// Identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Who created the specialization
    pub created_by: String,
    /// When the specialization was created
    pub creation_date: DateTime<Utc>,
}

/// Create/update body for [`Specialization`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SpecializationPayload {
    /// Display name
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Who created the specialization
    #[validate(length(min = 1, max = 256), custom(function = "not_blank"))]
    pub created_by: String,
}

impl Resource for Specialization {
    type Id = i32;
    type Payload = SpecializationPayload;

    const NAME: &'static str = "Specialization";
    const TABLE: &'static str = tables::SPECIALIZATIONS;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id,
            name: payload.name,
            created_by: payload.created_by,
            creation_date: now,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        self.name = payload.name;
        self.created_by = payload.created_by;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.created_by.as_str()]
    }
}

/// Building block, optionally nested inside another block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Enclosing block
    pub parent_block_id: Option<i32>,
    /// Specialization housed in this block
    pub specialization_id: i32,
}

/// Create/update body for [`Block`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    /// Display name
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Enclosing block
    #[serde(default)]
    #[validate(range(min = 1))]
    pub parent_block_id: Option<i32>,
    /// Specialization housed in this block
    #[validate(range(min = 1))]
    pub specialization_id: i32,
}

impl Resource for Block {
    type Id = i32;
    type Payload = BlockPayload;

    const NAME: &'static str = "Block";
    const TABLE: &'static str = tables::BLOCKS;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, _now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id,
            name: payload.name,
            parent_block_id: payload.parent_block_id,
            specialization_id: payload.specialization_id,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        if payload.parent_block_id == Some(self.id) {
            return Err(Error::validation(
                "parentBlockId",
                "a block cannot be its own parent",
            ));
        }
        self.name = payload.name;
        self.parent_block_id = payload.parent_block_id;
        self.specialization_id = payload.specialization_id;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str()]
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            Reference::to(
                "specializationId",
                tables::SPECIALIZATIONS,
                self.specialization_id,
            ),
            Reference::optional("parentBlockId", tables::BLOCKS, self.parent_block_id),
        ]
    }
}

/// Service desk located in a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDesk {
    /// Identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Free-form opening hours, e.g. `Mon-Fri 08:00-16:00`
    pub operating_hours: String,
    /// Block the desk is located in
    pub block_id: i32,
}

/// Create/update body for [`ServiceDesk`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDeskPayload {
    /// Display name
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: String,
    /// Contact email
    #[validate(email, length(max = 100))]
    pub email: String,
    /// Opening hours
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub operating_hours: String,
    /// Block the desk is located in
    #[validate(range(min = 1))]
    pub block_id: i32,
}

impl Resource for ServiceDesk {
    type Id = i32;
    type Payload = ServiceDeskPayload;

    const NAME: &'static str = "ServiceDesk";
    const TABLE: &'static str = tables::SERVICE_DESKS;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, _now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id,
            name: payload.name,
            email: payload.email,
            operating_hours: payload.operating_hours,
            block_id: payload.block_id,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        self.name = payload.name;
        self.email = payload.email;
        self.operating_hours = payload.operating_hours;
        self.block_id = payload.block_id;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.name.as_str(), self.email.as_str(), self.operating_hours.as_str()]
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::to("blockId", tables::BLOCKS, self.block_id)]
    }
}

/// Role profile attached to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Patient booking consultations
    Patient,
    /// General practitioner
    PrimaryCareDoctor,
    /// Doctor practicing one specialization
    SpecializedDoctor,
    /// Staff member running a service desk
    Administrator,
}

impl Role {
    /// Every role, in display order
    pub const ALL: [Self; 4] = [
        Self::Patient,
        Self::PrimaryCareDoctor,
        Self::SpecializedDoctor,
        Self::Administrator,
    ];

    /// Stable string form, as stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::PrimaryCareDoctor => "primaryCareDoctor",
            Self::SpecializedDoctor => "specializedDoctor",
            Self::Administrator => "administrator",
        }
    }

    /// Profile table sharing the user's primary key
    #[must_use]
    pub const fn profile_table(self) -> &'static str {
        match self {
            Self::Patient => "patients",
            Self::PrimaryCareDoctor => "primary_care_doctors",
            Self::SpecializedDoctor => "specialized_doctors",
            Self::Administrator => "administrators",
        }
    }

    /// Whether the profile carries a specialization
    #[must_use]
    pub const fn is_doctor(self) -> bool {
        matches!(self, Self::PrimaryCareDoctor | Self::SpecializedDoctor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation("role", format!("unknown role '{s}'")))
    }
}

/// User account with its role profile flattened in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier shared with the role profile
    pub id: Uuid,
    /// Login email, unique
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Gender as entered
    pub gender: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Role profile
    pub role: Role,
    /// Specialization for doctor roles
    #[serde(default)]
    pub specialization_id: Option<i32>,
    /// Service desk for administrators
    #[serde(default)]
    pub service_desk_id: Option<i32>,
    /// PBKDF2 hash, never sent over the wire
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

/// Create/update body for [`User`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_role_profile"))]
pub struct UserPayload {
    /// Login email
    #[validate(email, length(max = 256))]
    pub email: String,
    /// Given name
    #[validate(length(min = 1, max = 50), custom(function = "not_blank"))]
    pub first_name: String,
    /// Family name
    #[validate(length(min = 1, max = 50), custom(function = "not_blank"))]
    pub last_name: String,
    /// Gender
    #[validate(length(min = 1, max = 50), custom(function = "not_blank"))]
    pub gender: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Role profile
    pub role: Role,
    /// Specialization, required for doctor roles
    #[serde(default)]
    #[validate(range(min = 1))]
    pub specialization_id: Option<i32>,
    /// Service desk, required for administrators
    #[serde(default)]
    #[validate(range(min = 1))]
    pub service_desk_id: Option<i32>,
    /// Plain password; required on create, optional on update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 8, max = 255))]
    pub password: Option<String>,
}

fn validate_role_profile(payload: &UserPayload) -> std::result::Result<(), ValidationError> {
    if payload.role.is_doctor() && payload.specialization_id.is_none() {
        return Err(ValidationError::new("role_profile")
            .with_message(Cow::Borrowed("specializationId is required for doctors")));
    }
    if payload.role == Role::Administrator && payload.service_desk_id.is_none() {
        return Err(ValidationError::new("role_profile")
            .with_message(Cow::Borrowed("serviceDeskId is required for administrators")));
    }
    Ok(())
}

impl User {
    /// Display name, `First Last`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn set_profile(&mut self, payload: &UserPayload) {
        self.role = payload.role;
        self.specialization_id = payload
            .specialization_id
            .filter(|_| payload.role.is_doctor());
        self.service_desk_id = payload
            .service_desk_id
            .filter(|_| payload.role == Role::Administrator);
    }
}

impl Resource for User {
    type Id = Uuid;
    type Payload = UserPayload;

    const NAME: &'static str = "User";
    const TABLE: &'static str = tables::USERS;

    fn id(&self) -> Uuid {
        self.id
    }

    fn create(id: Uuid, payload: Self::Payload, _now: DateTime<Utc>) -> Result<Self> {
        let Some(password) = payload.password.as_deref() else {
            return Err(Error::validation("password", "password is required"));
        };
        let mut user = Self {
            id,
            email: payload.email.clone(),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            gender: payload.gender.clone(),
            birth_date: payload.birth_date,
            role: payload.role,
            specialization_id: None,
            service_desk_id: None,
            password_hash: utils::hash_password(password)?,
        };
        user.set_profile(&payload);
        Ok(user)
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        if let Some(password) = payload.password.as_deref() {
            self.password_hash = utils::hash_password(password)?;
        }
        self.set_profile(&payload);
        self.email = payload.email;
        self.first_name = payload.first_name;
        self.last_name = payload.last_name;
        self.gender = payload.gender;
        self.birth_date = payload.birth_date;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.email.as_str(), self.first_name.as_str(), self.last_name.as_str()]
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            Reference::optional(
                "specializationId",
                tables::SPECIALIZATIONS,
                self.specialization_id,
            ),
            Reference::optional("serviceDeskId", tables::SERVICE_DESKS, self.service_desk_id),
        ]
    }

    fn role(&self) -> Option<&'static str> {
        Some(self.role.as_str())
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("email", self.email.to_lowercase())]
    }
}

/// Consultation reservation booked by a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Identifier
    pub id: i32,
    /// Patient account
    pub patient_id: Uuid,
    /// Requested specialization
    pub specialization_id: i32,
    /// Chosen doctor, `None` for the earliest available one
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    /// Why the patient wants a consultation
    pub reason_of_consult: String,
    /// Requested appointment time
    pub appointment_date: DateTime<Utc>,
    /// When the reservation was made
    pub creation_date: DateTime<Utc>,
}

/// Create/update body for [`Reservation`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPayload {
    /// Patient account
    pub patient_id: Uuid,
    /// Requested specialization
    #[validate(range(min = 1))]
    pub specialization_id: i32,
    /// Chosen doctor
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    /// Why the patient wants a consultation
    #[validate(length(min = 1, max = 2000), custom(function = "not_blank"))]
    pub reason_of_consult: String,
    /// Requested appointment time
    pub appointment_date: DateTime<Utc>,
}

impl Resource for Reservation {
    type Id = i32;
    type Payload = ReservationPayload;

    const NAME: &'static str = "Reservation";
    const TABLE: &'static str = tables::RESERVATIONS;

    fn id(&self) -> i32 {
        self.id
    }

    fn create(id: i32, payload: Self::Payload, now: DateTime<Utc>) -> Result<Self> {
        if payload.appointment_date < now {
            return Err(Error::validation(
                "appointmentDate",
                "appointment must be in the future",
            ));
        }
        Ok(Self {
            id,
            patient_id: payload.patient_id,
            specialization_id: payload.specialization_id,
            doctor_id: payload.doctor_id,
            reason_of_consult: payload.reason_of_consult,
            appointment_date: payload.appointment_date,
            creation_date: now,
        })
    }

    fn apply(&mut self, payload: Self::Payload) -> Result<()> {
        self.patient_id = payload.patient_id;
        self.specialization_id = payload.specialization_id;
        self.doctor_id = payload.doctor_id;
        self.reason_of_consult = payload.reason_of_consult;
        self.appointment_date = payload.appointment_date;
        Ok(())
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.reason_of_consult.as_str()]
    }

    fn references(&self) -> Vec<Reference> {
        vec![
            Reference::to("patientId", tables::USERS, self.patient_id)
                .with_role(Role::Patient.as_str()),
            Reference::to(
                "specializationId",
                tables::SPECIALIZATIONS,
                self.specialization_id,
            ),
            Reference::optional("doctorId", tables::USERS, self.doctor_id)
                .with_role(Role::SpecializedDoctor.as_str()),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use crate::resource::{Key, validate_payload};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    fn help_center_payload() -> HelpCenterPayload {
        HelpCenterPayload {
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            subject: "S".to_string(),
            message: "M".to_string(),
            category_id: 1,
        }
    }

    fn user_payload(role: Role) -> UserPayload {
        UserPayload {
            email: "ann@klinika.test".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Smith".to_string(),
            gender: "female".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 1).unwrap(),
            role,
            specialization_id: None,
            service_desk_id: None,
            password: Some("correct horse".to_string()),
        }
    }

    #[test]
    fn test_help_center_create_keeps_fields() {
        let ticket = HelpCenter::create(7, help_center_payload(), now()).unwrap();

        assert_eq!(ticket.id, 7);
        assert_eq!(ticket.email, "a@b.com");
        assert_eq!(ticket.name, "Ann");
        assert_eq!(ticket.subject, "S");
        assert_eq!(ticket.message, "M");
        assert_eq!(ticket.category_id, 1);
        assert_eq!(ticket.creation_date, now());
    }

    #[test]
    fn test_help_center_update_keeps_creation_date() {
        let mut ticket = HelpCenter::create(1, help_center_payload(), now()).unwrap();
        let mut payload = help_center_payload();
        payload.subject = "Billing".to_string();

        ticket.apply(payload).unwrap();
        assert_eq!(ticket.subject, "Billing");
        assert_eq!(ticket.creation_date, now());
    }

    #[test]
    fn test_help_center_serializes_camel_case() {
        let ticket = HelpCenter::create(1, help_center_payload(), now()).unwrap();
        let json = serde_json::to_value(&ticket).unwrap();

        assert_eq!(json["categoryId"], 1);
        assert!(json.get("creationDate").is_some());
        assert!(json.get("category_id").is_none());
    }

    #[rstest]
    #[case::blank_name(HelpCenterPayload { name: "  ".to_string(), ..help_center_payload() }, "name")]
    #[case::bad_email(HelpCenterPayload { email: "nope".to_string(), ..help_center_payload() }, "email")]
    #[case::long_subject(HelpCenterPayload { subject: "x".repeat(256), ..help_center_payload() }, "subject")]
    #[case::long_message(HelpCenterPayload { message: "x".repeat(5001), ..help_center_payload() }, "message")]
    #[case::no_category(HelpCenterPayload { category_id: 0, ..help_center_payload() }, "categoryId")]
    fn test_help_center_payload_rules(#[case] payload: HelpCenterPayload, #[case] field: &str) {
        let err = validate_payload(&payload).unwrap_err();
        match err {
            Error::Validation { field: actual, .. } => {
                assert_eq!(actual, field);
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let ticket = HelpCenter::create(1, help_center_payload(), now()).unwrap();
        assert!(ticket.matches("ann"));
        assert!(ticket.matches("A@B"));
        assert!(ticket.matches(""));
        assert!(!ticket.matches("zebra"));
    }

    #[test]
    fn test_block_references_include_parent() {
        let block = Block::create(
            2,
            BlockPayload {
                name: "East wing".to_string(),
                parent_block_id: Some(1),
                specialization_id: 3,
            },
            now(),
        )
        .unwrap();

        let refs = block.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].key, Some(Key::Int(3)));
        assert_eq!(refs[1].table, tables::BLOCKS);
        assert_eq!(refs[1].key, Some(Key::Int(1)));
    }

    #[test]
    fn test_block_cannot_parent_itself() {
        let mut block = Block {
            id: 4,
            name: "A".to_string(),
            parent_block_id: None,
            specialization_id: 1,
        };
        let err = block
            .apply(BlockPayload {
                name: "A".to_string(),
                parent_block_id: Some(4),
                specialization_id: 1,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_user_create_hashes_password_and_hides_it() {
        let user = User::create(Uuid::new_v4(), user_payload(Role::Patient), now()).unwrap();

        assert!(utils::verify_password("correct horse", &user.password_hash));
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "patient");
    }

    #[test]
    fn test_user_create_requires_password() {
        let mut payload = user_payload(Role::Patient);
        payload.password = None;
        let err = User::create(Uuid::new_v4(), payload, now()).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "password"));
    }

    #[test]
    fn test_user_update_without_password_keeps_hash() {
        let mut user = User::create(Uuid::new_v4(), user_payload(Role::Patient), now()).unwrap();
        let hash = user.password_hash.clone();
        let mut payload = user_payload(Role::Patient);
        payload.password = None;
        payload.first_name = "Anna".to_string();

        user.apply(payload).unwrap();
        assert_eq!(user.first_name, "Anna");
        assert_eq!(user.password_hash, hash);
    }

    #[test]
    fn test_doctor_requires_specialization() {
        let payload = user_payload(Role::SpecializedDoctor);
        let err = validate_payload(&payload).unwrap_err();
        match err {
            Error::Validation { field, message } => {
                assert_eq!(field, "payload");
                assert!(message.contains("specializationId"));
            }
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_profile_keys_follow_role() {
        let mut payload = user_payload(Role::Patient);
        payload.specialization_id = Some(2);
        let patient = User::create(Uuid::new_v4(), payload, now()).unwrap();
        assert_eq!(patient.specialization_id, None);

        let mut payload = user_payload(Role::PrimaryCareDoctor);
        payload.specialization_id = Some(2);
        let doctor = User::create(Uuid::new_v4(), payload, now()).unwrap();
        assert_eq!(doctor.specialization_id, Some(2));
        assert_eq!(doctor.references()[0].key, Some(Key::Int(2)));
    }

    #[rstest]
    #[case("patient", Role::Patient)]
    #[case("PrimaryCareDoctor", Role::PrimaryCareDoctor)]
    #[case("specializeddoctor", Role::SpecializedDoctor)]
    #[case("administrator", Role::Administrator)]
    fn test_role_from_str(#[case] raw: &str, #[case] expected: Role) {
        assert_eq!(raw.parse::<Role>().unwrap(), expected);
    }

    #[test]
    fn test_reservation_must_be_in_future() {
        let payload = ReservationPayload {
            patient_id: Uuid::new_v4(),
            specialization_id: 1,
            doctor_id: None,
            reason_of_consult: "Headache".to_string(),
            appointment_date: now() - chrono::Duration::days(1),
        };
        let err = Reservation::create(1, payload, now()).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "appointmentDate"));
    }
}
