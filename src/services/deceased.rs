use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        deceased::{
            CreateDeceasedRequest, Deceased, DeceasedDetail, DeceasedQuery, NextOfKin,
            NextOfKinInput, UpdateDeceasedRequest, UpdateDeceasedStatusRequest,
            UpdateNextOfKinRequest,
        },
        user::Permission,
        PageQuery, Paginated,
    },
    services::activity::ActivityLogger,
};

const DECEASED_COLS: &str =
    "id, first_name, last_name, date_of_birth, date_of_death, place_of_death, cause_of_death,
     gender, identity_number, religion, notes, storage_location, preparation_status,
     release_status, created_by, created_at, updated_at";

const KIN_COLS: &str =
    "id, deceased_id, name, relationship, phone, email, address, is_primary, created_at";

/// Clients see records they created or that one of their bookings is for.
const CLIENT_VISIBLE: &str = "(d.created_by = $1 OR EXISTS (
        SELECT 1 FROM bookings b WHERE b.deceased_id = d.id AND b.user_id = $1))";

/// Bounded text columns on `deceased` and `next_of_kin`, as (field, value, max).
fn check_lengths(fields: &[(&str, Option<&str>, usize)], errors: &mut Vec<FieldError>) {
    for (field, value, max) in fields {
        if let Some(value) = value {
            FieldError::check_len(errors, field, value, *max);
        }
    }
}

fn deceased_lengths<'a>(
    first_name: Option<&'a str>,
    last_name: Option<&'a str>,
    gender: Option<&'a str>,
    identity_number: Option<&'a str>,
    religion: Option<&'a str>,
    storage_location: Option<&'a str>,
) -> [(&'static str, Option<&'a str>, usize); 6] {
    [
        ("first_name", first_name, 128),
        ("last_name", last_name, 128),
        ("gender", gender, 32),
        ("identity_number", identity_number, 64),
        ("religion", religion, 64),
        ("storage_location", storage_location, 128),
    ]
}

fn validate_kin(kin: &NextOfKinInput, index: usize, errors: &mut Vec<FieldError>) {
    if kin.name.trim().is_empty() {
        errors.push(FieldError::new(&format!("next_of_kin[{index}].name"), "Name is required"));
    }
    if kin.relationship.trim().is_empty() {
        errors.push(FieldError::new(
            &format!("next_of_kin[{index}].relationship"),
            "Relationship is required",
        ));
    }
    if kin.phone.trim().is_empty() {
        errors.push(FieldError::new(&format!("next_of_kin[{index}].phone"), "Phone is required"));
    }
    let name = format!("next_of_kin[{index}].name");
    let relationship = format!("next_of_kin[{index}].relationship");
    let phone = format!("next_of_kin[{index}].phone");
    let email = format!("next_of_kin[{index}].email");
    check_lengths(
        &[
            (name.as_str(), Some(kin.name.as_str()), 255),
            (relationship.as_str(), Some(kin.relationship.as_str()), 64),
            (phone.as_str(), Some(kin.phone.as_str()), 32),
            (email.as_str(), kin.email.as_deref(), 255),
        ],
        errors,
    );
}

pub fn validate_create(req: &CreateDeceasedRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.first_name.trim().is_empty() {
        errors.push(FieldError::new("first_name", "First name is required"));
    }
    if req.last_name.trim().is_empty() {
        errors.push(FieldError::new("last_name", "Last name is required"));
    }
    if let Some(born) = req.date_of_birth {
        if born > req.date_of_death {
            errors.push(FieldError::new("date_of_birth", "Date of birth is after date of death"));
        }
    }
    check_lengths(
        &deceased_lengths(
            Some(req.first_name.as_str()),
            Some(req.last_name.as_str()),
            req.gender.as_deref(),
            req.identity_number.as_deref(),
            req.religion.as_deref(),
            req.storage_location.as_deref(),
        ),
        &mut errors,
    );
    for (i, kin) in req.next_of_kin.iter().enumerate() {
        validate_kin(kin, i, &mut errors);
    }
    errors
}

/// Index of the contact that stays primary: the first one flagged.
pub fn primary_index(kin: &[NextOfKinInput]) -> Option<usize> {
    kin.iter().position(|k| k.is_primary)
}

pub struct DeceasedService;

impl DeceasedService {
    /// Inserts the record and its next of kin in one transaction.
    pub async fn create(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        req: &CreateDeceasedRequest,
    ) -> AppResult<DeceasedDetail> {
        AppError::check(validate_create(req))?;

        let mut tx = pool.begin().await?;

        let deceased = sqlx::query_as::<_, Deceased>(&format!(
            "INSERT INTO deceased
                (first_name, last_name, date_of_birth, date_of_death, place_of_death, cause_of_death,
                 gender, identity_number, religion, notes, storage_location, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {DECEASED_COLS}"
        ))
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.date_of_birth)
        .bind(req.date_of_death)
        .bind(&req.place_of_death)
        .bind(&req.cause_of_death)
        .bind(&req.gender)
        .bind(&req.identity_number)
        .bind(&req.religion)
        .bind(&req.notes)
        .bind(&req.storage_location)
        .bind(requester.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let primary = primary_index(&req.next_of_kin);
        let mut next_of_kin = Vec::with_capacity(req.next_of_kin.len());
        for (i, kin) in req.next_of_kin.iter().enumerate() {
            let row = Self::insert_kin(&mut tx, deceased.id, kin, primary == Some(i)).await?;
            next_of_kin.push(row);
        }

        tx.commit().await?;

        tracing::info!(deceased_id = %deceased.id, "deceased record created");
        activity.log(
            ActivityEntry::new(
                "deceased",
                "created",
                format!("{} {}", deceased.first_name, deceased.last_name),
            )
            .reference(deceased.id)
            .by(requester.user_id),
        );

        Ok(DeceasedDetail { deceased, next_of_kin })
    }

    async fn insert_kin(
        tx: &mut Transaction<'_, Postgres>,
        deceased_id: Uuid,
        kin: &NextOfKinInput,
        is_primary: bool,
    ) -> AppResult<NextOfKin> {
        let row = sqlx::query_as::<_, NextOfKin>(&format!(
            "INSERT INTO next_of_kin (deceased_id, name, relationship, phone, email, address, is_primary)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {KIN_COLS}"
        ))
        .bind(deceased_id)
        .bind(kin.name.trim())
        .bind(kin.relationship.trim())
        .bind(kin.phone.trim())
        .bind(&kin.email)
        .bind(&kin.address)
        .bind(is_primary)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    pub async fn list(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        query: &DeceasedQuery,
    ) -> AppResult<Paginated<Deceased>> {
        let page = PageQuery::new(query.page, query.limit);
        let search = query.search.as_deref().map(|s| format!("%{}%", s.trim()));
        let restrict = !requester.can(Permission::ManageDeceased);

        let filter = format!(
            "($2 = FALSE OR {CLIENT_VISIBLE})
             AND ($3::text IS NULL OR d.first_name ILIKE $3 OR d.last_name ILIKE $3
                  OR d.identity_number ILIKE $3)
             AND ($4::text IS NULL OR d.preparation_status = $4)
             AND ($5::text IS NULL OR d.release_status = $5)"
        );

        let rows = sqlx::query_as::<_, Deceased>(&format!(
            "SELECT {DECEASED_COLS} FROM deceased d
             WHERE {filter}
             ORDER BY d.date_of_death DESC, d.created_at DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(requester.user_id)
        .bind(restrict)
        .bind(&search)
        .bind(query.preparation_status)
        .bind(query.release_status)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM deceased d WHERE {filter}"))
            .bind(requester.user_id)
            .bind(restrict)
            .bind(&search)
            .bind(query.preparation_status)
            .bind(query.release_status)
            .fetch_one(pool)
            .await?;

        Ok(Paginated::new(rows, total, page))
    }

    pub async fn fetch(pool: &PgPool, id: Uuid) -> AppResult<Deceased> {
        sqlx::query_as::<_, Deceased>(&format!("SELECT {DECEASED_COLS} FROM deceased WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Deceased record not found"))
    }

    /// NotFound when absent, Forbidden when the requester may not see it.
    pub async fn ensure_visible(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<Deceased> {
        let deceased = Self::fetch(pool, id).await?;
        if requester.can(Permission::ManageDeceased) || deceased.created_by == Some(requester.user_id) {
            return Ok(deceased);
        }
        let has_booking: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE deceased_id = $1 AND user_id = $2)",
        )
        .bind(id)
        .bind(requester.user_id)
        .fetch_one(pool)
        .await?;
        if has_booking {
            Ok(deceased)
        } else {
            Err(AppError::forbidden("You do not have access to this record"))
        }
    }

    pub async fn get(pool: &PgPool, requester: &AuthenticatedUser, id: Uuid) -> AppResult<DeceasedDetail> {
        let deceased = Self::ensure_visible(pool, requester, id).await?;
        let next_of_kin = Self::list_kin(pool, id).await?;
        Ok(DeceasedDetail { deceased, next_of_kin })
    }

    pub async fn list_kin(pool: &PgPool, deceased_id: Uuid) -> AppResult<Vec<NextOfKin>> {
        let rows = sqlx::query_as::<_, NextOfKin>(&format!(
            "SELECT {KIN_COLS} FROM next_of_kin WHERE deceased_id = $1
             ORDER BY is_primary DESC, created_at"
        ))
        .bind(deceased_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn update(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateDeceasedRequest,
    ) -> AppResult<Deceased> {
        requester.authorize(Permission::ManageDeceased)?;
        let mut errors = Vec::new();
        check_lengths(
            &deceased_lengths(
                req.first_name.as_deref(),
                req.last_name.as_deref(),
                req.gender.as_deref(),
                req.identity_number.as_deref(),
                req.religion.as_deref(),
                req.storage_location.as_deref(),
            ),
            &mut errors,
        );
        AppError::check(errors)?;

        let deceased = sqlx::query_as::<_, Deceased>(&format!(
            "UPDATE deceased
             SET first_name       = COALESCE($1, first_name),
                 last_name        = COALESCE($2, last_name),
                 date_of_birth    = COALESCE($3, date_of_birth),
                 date_of_death    = COALESCE($4, date_of_death),
                 place_of_death   = COALESCE($5, place_of_death),
                 cause_of_death   = COALESCE($6, cause_of_death),
                 gender           = COALESCE($7, gender),
                 identity_number  = COALESCE($8, identity_number),
                 religion         = COALESCE($9, religion),
                 notes            = COALESCE($10, notes),
                 storage_location = COALESCE($11, storage_location),
                 updated_at       = NOW()
             WHERE id = $12
             RETURNING {DECEASED_COLS}"
        ))
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.date_of_birth)
        .bind(req.date_of_death)
        .bind(&req.place_of_death)
        .bind(&req.cause_of_death)
        .bind(&req.gender)
        .bind(&req.identity_number)
        .bind(&req.religion)
        .bind(&req.notes)
        .bind(&req.storage_location)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Deceased record not found"))?;

        activity.log(ActivityEntry::new("deceased", "updated", "").reference(id).by(requester.user_id));
        Ok(deceased)
    }

    /// Preparation and release are independent of booking status.
    pub async fn set_status(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateDeceasedStatusRequest,
    ) -> AppResult<Deceased> {
        requester.authorize(Permission::ManageDeceased)?;
        if req.preparation_status.is_none() && req.release_status.is_none() {
            return Err(AppError::bad_request(
                "Provide preparation_status and/or release_status",
            ));
        }

        let deceased = sqlx::query_as::<_, Deceased>(&format!(
            "UPDATE deceased
             SET preparation_status = COALESCE($1, preparation_status),
                 release_status     = COALESCE($2, release_status),
                 updated_at         = NOW()
             WHERE id = $3
             RETURNING {DECEASED_COLS}"
        ))
        .bind(req.preparation_status)
        .bind(req.release_status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Deceased record not found"))?;

        tracing::info!(
            deceased_id = %id,
            preparation = %deceased.preparation_status,
            release = %deceased.release_status,
            "deceased status updated"
        );
        activity.log(
            ActivityEntry::new(
                "deceased",
                "status_changed",
                format!(
                    "preparation={} release={}",
                    deceased.preparation_status, deceased.release_status
                ),
            )
            .reference(id)
            .by(requester.user_id),
        );
        Ok(deceased)
    }

    /// Next of kin go with the record; bookings referencing it block deletion.
    pub async fn delete(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<()> {
        requester.authorize(Permission::DeleteDeceased)?;

        let result = sqlx::query("DELETE FROM deceased WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::conflict("Deceased record has bookings and cannot be deleted")
                }
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Deceased record not found"));
        }

        activity.log(ActivityEntry::new("deceased", "deleted", "").reference(id).by(requester.user_id));
        Ok(())
    }

    async fn ensure_can_edit_kin(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        deceased_id: Uuid,
    ) -> AppResult<()> {
        let deceased = Self::fetch(pool, deceased_id).await?;
        requester.authorize_owner_or(deceased.created_by, Permission::ManageDeceased)
    }

    pub async fn add_kin(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        deceased_id: Uuid,
        kin: &NextOfKinInput,
    ) -> AppResult<NextOfKin> {
        Self::ensure_can_edit_kin(pool, requester, deceased_id).await?;
        let mut errors = Vec::new();
        validate_kin(kin, 0, &mut errors);
        AppError::check(errors)?;

        let mut tx = pool.begin().await?;
        if kin.is_primary {
            Self::clear_primary(&mut tx, deceased_id).await?;
        }
        let row = Self::insert_kin(&mut tx, deceased_id, kin, kin.is_primary).await?;
        tx.commit().await?;

        activity.log(
            ActivityEntry::new("next_of_kin", "added", row.name.clone())
                .reference(deceased_id)
                .by(requester.user_id),
        );
        Ok(row)
    }

    async fn clear_primary(tx: &mut Transaction<'_, Postgres>, deceased_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE next_of_kin SET is_primary = FALSE WHERE deceased_id = $1")
            .bind(deceased_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn update_kin(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        deceased_id: Uuid,
        kin_id: Uuid,
        req: &UpdateNextOfKinRequest,
    ) -> AppResult<NextOfKin> {
        Self::ensure_can_edit_kin(pool, requester, deceased_id).await?;
        let mut errors = Vec::new();
        check_lengths(
            &[
                ("name", req.name.as_deref(), 255),
                ("relationship", req.relationship.as_deref(), 64),
                ("phone", req.phone.as_deref(), 32),
                ("email", req.email.as_deref(), 255),
            ],
            &mut errors,
        );
        AppError::check(errors)?;

        let mut tx = pool.begin().await?;
        if req.is_primary == Some(true) {
            Self::clear_primary(&mut tx, deceased_id).await?;
        }
        let row = sqlx::query_as::<_, NextOfKin>(&format!(
            "UPDATE next_of_kin
             SET name         = COALESCE($1, name),
                 relationship = COALESCE($2, relationship),
                 phone        = COALESCE($3, phone),
                 email        = COALESCE($4, email),
                 address      = COALESCE($5, address),
                 is_primary   = COALESCE($6, is_primary)
             WHERE id = $7 AND deceased_id = $8
             RETURNING {KIN_COLS}"
        ))
        .bind(&req.name)
        .bind(&req.relationship)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.address)
        .bind(req.is_primary)
        .bind(kin_id)
        .bind(deceased_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Next of kin not found"))?;
        tx.commit().await?;

        activity.log(
            ActivityEntry::new("next_of_kin", "updated", row.name.clone())
                .reference(deceased_id)
                .by(requester.user_id),
        );
        Ok(row)
    }

    pub async fn remove_kin(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        deceased_id: Uuid,
        kin_id: Uuid,
    ) -> AppResult<()> {
        Self::ensure_can_edit_kin(pool, requester, deceased_id).await?;

        let result = sqlx::query("DELETE FROM next_of_kin WHERE id = $1 AND deceased_id = $2")
            .bind(kin_id)
            .bind(deceased_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Next of kin not found"));
        }

        activity.log(
            ActivityEntry::new("next_of_kin", "removed", kin_id.to_string())
                .reference(deceased_id)
                .by(requester.user_id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn kin(name: &str, primary: bool) -> NextOfKinInput {
        NextOfKinInput {
            name: name.into(),
            relationship: "sibling".into(),
            phone: "0712345678".into(),
            email: None,
            address: None,
            is_primary: primary,
        }
    }

    fn request(next_of_kin: Vec<NextOfKinInput>) -> CreateDeceasedRequest {
        CreateDeceasedRequest {
            first_name: "Kofi".into(),
            last_name: "Mensah".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1950, 3, 1),
            date_of_death: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            place_of_death: None,
            cause_of_death: None,
            gender: None,
            identity_number: None,
            religion: None,
            notes: None,
            storage_location: None,
            next_of_kin,
        }
    }

    #[test]
    fn first_flagged_contact_stays_primary() {
        let list = vec![kin("A", false), kin("B", true), kin("C", true)];
        assert_eq!(primary_index(&list), Some(1));
        assert_eq!(primary_index(&[kin("A", false)]), None);
    }

    #[test]
    fn birth_after_death_is_rejected() {
        let mut req = request(vec![]);
        req.date_of_birth = NaiveDate::from_ymd_opt(2027, 1, 1);
        let errors = validate_create(&req);
        assert_eq!(errors[0].field, "date_of_birth");
    }

    #[test]
    fn incomplete_next_of_kin_is_named_by_index() {
        let mut bad = kin("", false);
        bad.phone = " ".into();
        let errors = validate_create(&request(vec![kin("A", true), bad]));
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["next_of_kin[1].name", "next_of_kin[1].phone"]);
    }

    #[test]
    fn overlong_columns_are_reported_before_insert() {
        let mut req = request(vec![kin("A", true)]);
        req.last_name = "x".repeat(129);
        req.identity_number = Some("9".repeat(65));
        req.next_of_kin[0].phone = "0".repeat(33);
        let errors = validate_create(&req);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["last_name", "identity_number", "next_of_kin[0].phone"]);
    }
}
