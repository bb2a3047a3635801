//! Analytics row mappings.

use chrono::{DateTime, Utc};
use domain::models::{AggregatedValue, AppointmentLogEntry, RevenueRow, ServiceUsageRow};
use sqlx::FromRow;

/// A `(label, count)` row from a grouped count query.
#[derive(Debug, Clone, FromRow)]
pub struct LabelCountEntity {
    pub label: String,
    pub count: i64,
}

impl From<LabelCountEntity> for AggregatedValue {
    fn from(entity: LabelCountEntity) -> Self {
        AggregatedValue::count(entity.label, entity.count)
    }
}

/// Confirmed revenue for one (service role, payment method) pair.
#[derive(Debug, Clone, FromRow)]
pub struct RevenueEntity {
    pub role: String,
    pub method: String,
    pub total_revenue: f64,
}

impl From<RevenueEntity> for RevenueRow {
    fn from(entity: RevenueEntity) -> Self {
        Self {
            role: entity.role,
            method: entity.method,
            total_revenue: entity.total_revenue,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceUsageEntity {
    pub service_name: String,
    pub role: String,
    pub usage_count: i64,
}

impl From<ServiceUsageEntity> for ServiceUsageRow {
    fn from(entity: ServiceUsageEntity) -> Self {
        Self {
            service_name: entity.service_name,
            role: entity.role,
            usage_count: entity.usage_count,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AppointmentLogEntity {
    pub created_at: DateTime<Utc>,
    pub staff: String,
    pub procedure_type: String,
    pub status: String,
}

impl From<AppointmentLogEntity> for AppointmentLogEntry {
    fn from(entity: AppointmentLogEntity) -> Self {
        Self {
            created_at: entity.created_at,
            staff: entity.staff,
            procedure_type: entity.procedure_type,
            status: entity.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::MetricValue;

    #[test]
    fn test_label_count_to_domain() {
        let value: AggregatedValue = LabelCountEntity {
            label: "Dental".to_string(),
            count: 15,
        }
        .into();
        assert_eq!(value.label, "Dental");
        assert_eq!(value.value, MetricValue::Count(15));
    }

    #[test]
    fn test_revenue_entity_to_domain() {
        let row: RevenueRow = RevenueEntity {
            role: "doctor".to_string(),
            method: "ecocash".to_string(),
            total_revenue: 250.5,
        }
        .into();
        assert_eq!(row.method, "ecocash");
        assert_eq!(row.total_revenue, 250.5);
    }
}
