//! Who may open a conversation with whom.
//!
//! Patients (`user` role) and doctors may talk only when an appointment in a
//! chat-eligible status exists between them. Admins may talk to anyone, and
//! same-role pairs are never allowed.

use crate::directory::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoAppointment,
    RoleNotAllowed,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NoAppointment => {
                "Bạn chỉ có thể nhắn tin khi đã có lịch hẹn với bác sĩ này"
            }
            DenyReason::RoleNotAllowed => "Không thể tạo cuộc trò chuyện giữa hai tài khoản này",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(DenyReason),
}

/// Whether a patient/doctor pair needs an appointment on file before chatting.
pub fn requires_appointment(requester: Role, target: Role) -> bool {
    matches!(
        (requester, target),
        (Role::User, Role::Doctor) | (Role::Doctor, Role::User)
    )
}

pub fn check_eligibility(
    requester: Role,
    target: Role,
    has_qualifying_appointment: bool,
) -> Eligibility {
    match (requester, target) {
        (Role::Admin, _) | (_, Role::Admin) => Eligibility::Allow,
        (Role::User, Role::Doctor) | (Role::Doctor, Role::User) => {
            if has_qualifying_appointment {
                Eligibility::Allow
            } else {
                Eligibility::Deny(DenyReason::NoAppointment)
            }
        }
        (Role::User, Role::User) | (Role::Doctor, Role::Doctor) => {
            Eligibility::Deny(DenyReason::RoleNotAllowed)
        }
    }
}
