use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Doctor,
    Admin,
}

impl Role {
    /// Unknown role strings fall back to the least privileged role.
    pub fn from_db(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "doctor" => Role::Doctor,
            "admin" | "superadmin" | "super_admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn role(&self) -> Role {
        Role::from_db(&self.role)
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            role: self.role(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Rejected,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Rejected,
    ];

    /// Statuses that open a chat channel between patient and doctor.
    pub const CHAT_ELIGIBLE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn allows_chat(&self) -> bool {
        Self::CHAT_ELIGIBLE.contains(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_user_id: Uuid,
    pub status: String,
    pub appointment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn status(&self) -> Option<AppointmentStatus> {
        AppointmentStatus::parse(&self.status)
    }

    pub fn involves(&self, a: Uuid, b: Uuid) -> bool {
        (self.patient_id == a && self.doctor_user_id == b)
            || (self.patient_id == b && self.doctor_user_id == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_db() {
        assert_eq!(Role::from_db("doctor"), Role::Doctor);
        assert_eq!(Role::from_db("Admin"), Role::Admin);
        assert_eq!(Role::from_db("superadmin"), Role::Admin);
        assert_eq!(Role::from_db("user"), Role::User);
        assert_eq!(Role::from_db("nurse"), Role::User);
    }

    #[test]
    fn test_appointment_status_chat_eligibility() {
        assert!(AppointmentStatus::Pending.allows_chat());
        assert!(AppointmentStatus::Confirmed.allows_chat());
        assert!(AppointmentStatus::Completed.allows_chat());
        assert!(!AppointmentStatus::Cancelled.allows_chat());
        assert!(!AppointmentStatus::Rejected.allows_chat());
        assert_eq!(
            AppointmentStatus::parse("CONFIRMED"),
            Some(AppointmentStatus::Confirmed)
        );
        assert_eq!(AppointmentStatus::parse("unknown"), None);
    }

    #[test]
    fn test_appointment_involves_either_direction() {
        let patient = Uuid::new_v4();
        let doctor_user = Uuid::new_v4();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: patient,
            doctor_id: Uuid::new_v4(),
            doctor_user_id: doctor_user,
            status: "confirmed".to_string(),
            appointment_date: Utc::now(),
            created_at: Utc::now(),
        };
        assert!(appointment.involves(patient, doctor_user));
        assert!(appointment.involves(doctor_user, patient));
        assert!(!appointment.involves(patient, Uuid::new_v4()));
    }
}
