use crate::error::Result;
use axum::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::directory_models::{Appointment, AppointmentStatus, UserProfile};

/// Read-only access to accounts, doctor profiles and appointments.
#[async_trait]
pub trait DirectoryRepository: Send + Sync + 'static {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>>;

    /// Resolve a doctor-profile id to the id of the user account that owns it.
    async fn find_doctor_owner(&self, doctor_id: Uuid) -> Result<Option<Uuid>>;

    /// Most recent appointment between the patient and the doctor's user account
    /// whose status opens a chat channel.
    async fn find_chat_appointment(
        &self,
        patient_id: Uuid,
        doctor_user_id: Uuid,
    ) -> Result<Option<Appointment>>;

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>>;
}

const APPOINTMENT_COLUMNS: &str = "a.id, a.patient_id, a.doctor_id, d.user_id AS doctor_user_id,
     a.status, a.appointment_date, a.created_at";

#[derive(Clone)]
pub struct PgDirectoryRepository {
    pool: PgPool,
}

impl PgDirectoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, UserProfile>(
            "SELECT id, full_name, email, phone, avatar_url, role, is_active, created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, UserProfile>(
            "SELECT id, full_name, email, phone, avatar_url, role, is_active, created_at
             FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn find_doctor_owner(&self, doctor_id: Uuid) -> Result<Option<Uuid>> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM doctors WHERE id = $1")
            .bind(doctor_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(owner)
    }

    async fn find_chat_appointment(
        &self,
        patient_id: Uuid,
        doctor_user_id: Uuid,
    ) -> Result<Option<Appointment>> {
        let statuses: Vec<String> = AppointmentStatus::CHAT_ELIGIBLE
            .iter()
            .map(|status| status.as_str().to_string())
            .collect();

        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {APPOINTMENT_COLUMNS}
             FROM appointments a
             JOIN doctors d ON d.id = a.doctor_id
             WHERE a.patient_id = $1 AND d.user_id = $2 AND a.status = ANY($3)
             ORDER BY a.appointment_date DESC
             LIMIT 1"
        ))
        .bind(patient_id)
        .bind(doctor_user_id)
        .bind(statuses)
        .fetch_optional(&self.pool)
        .await?;

        Ok(appointment)
    }

    async fn find_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>> {
        let appointment = sqlx::query_as::<_, Appointment>(&format!(
            "SELECT {APPOINTMENT_COLUMNS}
             FROM appointments a
             JOIN doctors d ON d.id = a.doctor_id
             WHERE a.id = $1"
        ))
        .bind(appointment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(appointment)
    }
}
