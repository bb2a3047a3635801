//! Staff contact lookups for scheduled reports.

use domain::models::{Recipient, Role};
use sqlx::PgPool;

use crate::entities::StaffContactEntity;
use crate::metrics::QueryTimer;

/// Repository for reading staff contact details.
#[derive(Clone)]
pub struct StaffRepository {
    pool: PgPool,
}

impl StaffRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Contact details of every user holding one of `roles`.
    pub async fn contacts_for_roles(
        &self,
        roles: &[Role],
    ) -> Result<Vec<StaffContactEntity>, sqlx::Error> {
        let roles: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();

        let timer = QueryTimer::new("staff_contacts_for_roles");
        let result = sqlx::query_as::<_, StaffContactEntity>(
            r#"
            SELECT username, email, phone, notify_method
            FROM users
            WHERE role = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&roles)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Report recipients via each staff member's preferred channel.
    ///
    /// Staff without an address for their preferred channel are skipped.
    pub async fn report_recipients(&self) -> Result<Vec<Recipient>, sqlx::Error> {
        let contacts = self.contacts_for_roles(Role::report_recipients()).await?;

        Ok(contacts
            .into_iter()
            .filter_map(|c| {
                let recipient = Recipient::from_preference(
                    c.notify_method.as_deref(),
                    c.email.as_deref(),
                    c.phone.as_deref(),
                );
                if recipient.is_none() {
                    tracing::debug!(username = %c.username, "Staff member has no usable contact, skipping");
                }
                recipient
            })
            .collect())
    }
}
