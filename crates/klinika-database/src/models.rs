//! Database row models for Klinika
//!
//! Rows mirror the relations in `migrations/` and convert into the core
//! entity types. Users are read from the `user_accounts` view, which folds
//! the role profile tables back into one row.

use chrono::{DateTime, NaiveDate, Utc};
use klinika_core::types::{
    Block, HelpCenter, HelpCenterCategory, Reservation, Role, ServiceDesk, Specialization, User,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for help-center categories
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HelpCenterCategoryRow {
    /// Unique identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Creator
    pub created_by: String,
    /// Creation timestamp
    pub creation_date: DateTime<Utc>,
}

impl From<HelpCenterCategoryRow> for HelpCenterCategory {
    fn from(row: HelpCenterCategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_by: row.created_by,
            creation_date: row.creation_date,
        }
    }
}

/// Database model for help-center tickets
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HelpCenterRow {
    /// Unique identifier
    pub id: i32,
    /// Sender name
    pub name: String,
    /// Sender email
    pub email: String,
    /// Subject
    pub subject: String,
    /// Body
    pub message: String,
    /// Creation timestamp
    pub creation_date: DateTime<Utc>,
    /// Category
    pub category_id: i32,
}

impl From<HelpCenterRow> for HelpCenter {
    fn from(row: HelpCenterRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            subject: row.subject,
            message: row.message,
            creation_date: row.creation_date,
            category_id: row.category_id,
        }
    }
}

/// Database model for specializations
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpecializationRow {
    /// Unique identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Creator
    pub created_by: String,
    /// Creation timestamp
    pub creation_date: DateTime<Utc>,
}

impl From<SpecializationRow> for Specialization {
    fn from(row: SpecializationRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_by: row.created_by,
            creation_date: row.creation_date,
        }
    }
}

/// Database model for blocks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlockRow {
    /// Unique identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Enclosing block
    pub parent_block_id: Option<i32>,
    /// Specialization
    pub specialization_id: i32,
}

impl From<BlockRow> for Block {
    fn from(row: BlockRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            parent_block_id: row.parent_block_id,
            specialization_id: row.specialization_id,
        }
    }
}

/// Database model for service desks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceDeskRow {
    /// Unique identifier
    pub id: i32,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Opening hours
    pub operating_hours: String,
    /// Block
    pub block_id: i32,
}

impl From<ServiceDeskRow> for ServiceDesk {
    fn from(row: ServiceDeskRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            operating_hours: row.operating_hours,
            block_id: row.block_id,
        }
    }
}

/// Database model for the `user_accounts` view
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccountRow {
    /// Unique identifier
    pub id: Uuid,
    /// Login email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Gender
    pub gender: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    /// Role as stored, e.g. `primaryCareDoctor`
    pub role: String,
    /// PBKDF2 hash
    pub password_hash: String,
    /// Specialization from a doctor profile
    pub specialization_id: Option<i32>,
    /// Service desk from an administrator profile
    pub service_desk_id: Option<i32>,
}

impl TryFrom<UserAccountRow> for User {
    type Error = klinika_core::Error;

    fn try_from(row: UserAccountRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| klinika_core::Error::Database(format!("unknown role '{}'", row.role)))?;

        Ok(Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            gender: row.gender,
            birth_date: row.birth_date,
            role,
            specialization_id: row.specialization_id,
            service_desk_id: row.service_desk_id,
            password_hash: row.password_hash,
        })
    }
}

/// Database model for reservations
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReservationRow {
    /// Unique identifier
    pub id: i32,
    /// Patient
    pub patient_id: Uuid,
    /// Specialization
    pub specialization_id: i32,
    /// Chosen doctor
    pub doctor_id: Option<Uuid>,
    /// Reason for the consultation
    pub reason_of_consult: String,
    /// Appointment time
    pub appointment_date: DateTime<Utc>,
    /// Creation timestamp
    pub creation_date: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            specialization_id: row.specialization_id,
            doctor_id: row.doctor_id,
            reason_of_consult: row.reason_of_consult,
            appointment_date: row.appointment_date,
            creation_date: row.creation_date,
        }
    }
}
