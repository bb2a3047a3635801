//! Clinic roles and the analytics operations each role may invoke.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role carried by an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Dentist,
    Nurse,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Dentist => "dentist",
            Role::Nurse => "nurse",
            Role::Patient => "patient",
        }
    }

    /// Staff roles that receive scheduled clinic reports.
    pub fn report_recipients() -> &'static [Role] {
        &[Role::Admin, Role::Doctor, Role::Dentist]
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "dentist" => Ok(Role::Dentist),
            "nurse" => Ok(Role::Nurse),
            "patient" => Ok(Role::Patient),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations exposed by the analytics subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsOperation {
    ComputeSummary,
    ViewCharts,
    ViewPopular,
    ViewDashboard,
    ViewMilestoneProgress,
    ViewMilestoneHistory,
    ExportReport,
    EmailReport,
    SmsReport,
    ViewNotificationLog,
    ViewRevenue,
    ExportRevenue,
    ViewServiceUsage,
}

const CLINICIANS: &[Role] = &[Role::Admin, Role::Doctor, Role::Dentist];
const ALL_STAFF: &[Role] = &[Role::Admin, Role::Doctor, Role::Dentist, Role::Nurse];
const ANY_ROLE: &[Role] = &[
    Role::Admin,
    Role::Doctor,
    Role::Dentist,
    Role::Nurse,
    Role::Patient,
];

impl AnalyticsOperation {
    /// Minimal set of roles permitted to invoke this operation.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            AnalyticsOperation::ComputeSummary
            | AnalyticsOperation::ViewCharts
            | AnalyticsOperation::ViewPopular
            | AnalyticsOperation::ViewDashboard
            | AnalyticsOperation::ExportReport
            | AnalyticsOperation::EmailReport
            | AnalyticsOperation::SmsReport => CLINICIANS,
            AnalyticsOperation::ViewMilestoneProgress => ANY_ROLE,
            AnalyticsOperation::ViewMilestoneHistory | AnalyticsOperation::ViewNotificationLog => {
                &[Role::Admin, Role::Doctor]
            }
            AnalyticsOperation::ViewRevenue | AnalyticsOperation::ExportRevenue => &[Role::Admin],
            AnalyticsOperation::ViewServiceUsage => ALL_STAFF,
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.allowed_roles().contains(&role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Dentist".parse::<Role>().unwrap(), Role::Dentist);
        assert!("receptionist".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display_roundtrip() {
        for role in [
            Role::Admin,
            Role::Doctor,
            Role::Dentist,
            Role::Nurse,
            Role::Patient,
        ] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn test_revenue_is_admin_only() {
        assert!(AnalyticsOperation::ViewRevenue.permits(Role::Admin));
        assert!(!AnalyticsOperation::ViewRevenue.permits(Role::Doctor));
        assert!(!AnalyticsOperation::ExportRevenue.permits(Role::Nurse));
    }

    #[test]
    fn test_service_usage_includes_nurses() {
        assert!(AnalyticsOperation::ViewServiceUsage.permits(Role::Nurse));
        assert!(!AnalyticsOperation::ViewServiceUsage.permits(Role::Patient));
    }

    #[test]
    fn test_reports_exclude_nurses_and_patients() {
        for op in [
            AnalyticsOperation::ExportReport,
            AnalyticsOperation::EmailReport,
            AnalyticsOperation::SmsReport,
            AnalyticsOperation::ComputeSummary,
        ] {
            assert!(op.permits(Role::Dentist));
            assert!(!op.permits(Role::Nurse));
            assert!(!op.permits(Role::Patient));
        }
    }

    #[test]
    fn test_history_and_logs_admin_and_doctor() {
        assert!(AnalyticsOperation::ViewMilestoneHistory.permits(Role::Doctor));
        assert!(!AnalyticsOperation::ViewMilestoneHistory.permits(Role::Dentist));
        assert!(AnalyticsOperation::ViewNotificationLog.permits(Role::Admin));
    }

    #[test]
    fn test_milestone_progress_open_to_all() {
        assert!(AnalyticsOperation::ViewMilestoneProgress.permits(Role::Patient));
    }
}
