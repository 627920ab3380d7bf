use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    application::repos::{CreateCustomerParams, CustomersRepo, RepoError},
    domain::customer::{CustomerDetails, CustomerProfile, DossierArtifact},
};

use super::{PostgresRepositories, map_sqlx_error};

const CUSTOMER_COLUMNS: &str = "id, first_name, last_name, email, phone, date_of_birth, \
     nationality, gender, age, yearly_income, current_address, permanent_address, status, \
     approved_at, notes, summary, artifact_path, artifact_generated_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    date_of_birth: Option<Date>,
    nationality: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    yearly_income: Option<i64>,
    current_address: Option<String>,
    permanent_address: Option<String>,
    status: Option<String>,
    approved_at: Option<OffsetDateTime>,
    notes: Option<String>,
    summary: Option<String>,
    artifact_path: Option<String>,
    artifact_generated_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CustomerRow> for CustomerProfile {
    fn from(row: CustomerRow) -> Self {
        let artifact = match (row.artifact_path, row.artifact_generated_at) {
            (Some(path), Some(generated_at)) => Some(DossierArtifact { path, generated_at }),
            _ => None,
        };

        Self {
            id: row.id,
            details: CustomerDetails {
                first_name: row.first_name,
                last_name: row.last_name,
                email: row.email,
                phone: row.phone,
                date_of_birth: row.date_of_birth,
                nationality: row.nationality,
                gender: row.gender,
                age: row.age,
                yearly_income: row.yearly_income,
                current_address: row.current_address,
                permanent_address: row.permanent_address,
                status: row.status,
                approved_at: row.approved_at,
                notes: row.notes,
            },
            summary: row.summary,
            artifact,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl CustomersRepo for PostgresRepositories {
    async fn create_customer(
        &self,
        params: CreateCustomerParams,
    ) -> Result<CustomerProfile, RepoError> {
        let CreateCustomerParams { details, summary } = params;

        let sql = format!(
            "INSERT INTO customers (
                 id, first_name, last_name, email, phone, date_of_birth, nationality, gender,
                 age, yearly_income, current_address, permanent_address, status, approved_at,
                 notes, summary
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             RETURNING {CUSTOMER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(details.first_name)
            .bind(details.last_name)
            .bind(details.email)
            .bind(details.phone)
            .bind(details.date_of_birth)
            .bind(details.nationality)
            .bind(details.gender)
            .bind(details.age)
            .bind(details.yearly_income)
            .bind(details.current_address)
            .bind(details.permanent_address)
            .bind(details.status)
            .bind(details.approved_at)
            .bind(details.notes)
            .bind(summary)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_customer(&self, id: Uuid) -> Result<Option<CustomerProfile>, RepoError> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        let row = sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn count_customers(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn update_artifact(
        &self,
        id: Uuid,
        artifact: &DossierArtifact,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE customers
               SET artifact_path = $2,
                   artifact_generated_at = $3,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&artifact.path)
        .bind(artifact.generated_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }
}
