use std::path::Path;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calendar::{CalendarError, JalaaliDate};
use crate::db::UserStore;
use crate::models::{
    AddressDraft, AddressPatch, AddressRecord, Gender, NewAddress, NewUser, UserChanges,
    UserDraft, UserPatch, UserRecord,
};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("cannot stamp today's date: {0}")]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl IntakeError {
    fn validation(field: &'static str, message: impl Into<String>) -> Self {
        IntakeError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub max_field_length: usize,
    /// Used to stamp a Jalaali date on submissions that carry none.
    pub offset: FixedOffset,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_field_length: 100,
            offset: crate::config::default_offset(),
        }
    }
}

pub struct UserService {
    store: Arc<dyn UserStore>,
    config: IntakeConfig,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, config: IntakeConfig) -> Self {
        Self { store, config }
    }

    pub async fn submit(&self, user: NewUser) -> Result<UserRecord, IntakeError> {
        let draft = UserDraft {
            first_name: self.required("first_name", &user.first_name)?,
            last_name: self.required("last_name", &user.last_name)?,
            phone_number: self.optional("phone_number", user.phone_number.as_deref())?,
            gender: parse_gender(&user.gender)?,
            persian_date: match user.persian_date.as_deref().map(str::trim) {
                Some(raw) if !raw.is_empty() => canonical_date(raw)?,
                _ => self.today()?.to_string(),
            },
            addresses: self.addresses(&user.addresses)?,
        };

        let created = self.store.create_user(draft).await?;
        info!(user_id = %created.id, persian_date = ?created.persian_date, "user submitted");
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, IntakeError> {
        let users = self.store.list_users().await?;
        info!(count = users.len(), "listed users");
        Ok(users)
    }

    pub async fn get(&self, id: Uuid) -> Result<UserRecord, IntakeError> {
        self.store
            .get_user(id)
            .await?
            .ok_or(IntakeError::NotFound("user"))
    }

    /// Applies the non-empty fields of `patch`; a non-empty `addresses` list
    /// replaces the stored addresses.
    pub async fn edit(
        &self,
        id: Uuid,
        patch: UserPatch,
        addresses: Vec<NewAddress>,
    ) -> Result<UserRecord, IntakeError> {
        let changes = UserChanges {
            first_name: self.optional("first_name", patch.first_name.as_deref())?,
            last_name: self.optional("last_name", patch.last_name.as_deref())?,
            phone_number: self.optional("phone_number", patch.phone_number.as_deref())?,
            gender: match non_empty(patch.gender.as_deref()) {
                Some(raw) => Some(parse_gender(raw)?),
                None => None,
            },
            persian_date: match non_empty(patch.persian_date.as_deref()) {
                Some(raw) => Some(canonical_date(raw)?),
                None => None,
            },
            addresses: if addresses.is_empty() {
                None
            } else {
                Some(self.addresses(&addresses)?)
            },
        };

        let updated = self
            .store
            .update_user(id, changes)
            .await?
            .ok_or(IntakeError::NotFound("user"))?;
        info!(user_id = %id, "user edited");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), IntakeError> {
        if self.store.soft_delete_user(id).await? {
            info!(user_id = %id, "user soft-deleted");
            Ok(())
        } else {
            Err(IntakeError::NotFound("user"))
        }
    }

    pub async fn addresses_of(&self, user_id: Uuid) -> Result<Vec<AddressRecord>, IntakeError> {
        Ok(self.store.list_addresses(user_id).await?)
    }

    pub async fn add_address(
        &self,
        user_id: Uuid,
        address: NewAddress,
    ) -> Result<AddressRecord, IntakeError> {
        let draft = self.address(&address)?;
        self.store
            .add_address(user_id, draft)
            .await?
            .ok_or(IntakeError::NotFound("user"))
    }

    pub async fn edit_address(
        &self,
        user_id: Uuid,
        address_id: Uuid,
        patch: AddressPatch,
    ) -> Result<AddressRecord, IntakeError> {
        let patch = AddressPatch {
            subject: self.optional("subject", patch.subject.as_deref())?,
            details: self.optional("details", patch.details.as_deref())?,
        };
        self.store
            .update_address(user_id, address_id, patch)
            .await?
            .ok_or(IntakeError::NotFound("address"))
    }

    pub async fn delete_address(&self, user_id: Uuid, address_id: Uuid) -> Result<(), IntakeError> {
        if self.store.delete_address(user_id, address_id).await? {
            Ok(())
        } else {
            Err(IntakeError::NotFound("address"))
        }
    }

    /// Users whose Jalaali date falls in `year`/`month`. Both accept Persian
    /// digits; month may be given without zero padding.
    pub async fn users_in_month(&self, year: &str, month: &str) -> Result<Vec<UserRecord>, IntakeError> {
        let year: i32 = crate::calendar::normalize_digits(year.trim())
            .parse()
            .map_err(|_| IntakeError::validation("year", "expected a 4 digit jalaali year"))?;
        let month: u32 = crate::calendar::normalize_digits(month.trim())
            .parse()
            .map_err(|_| IntakeError::validation("month", "expected a month number"))?;
        JalaaliDate::new(year, month, 1)
            .map_err(|err| IntakeError::validation("month", err.to_string()))?;

        Ok(self.store.users_in_month(year, month).await?)
    }

    fn today(&self) -> Result<JalaaliDate, IntakeError> {
        let today = Utc::now().with_timezone(&self.config.offset).date_naive();
        Ok(JalaaliDate::from_gregorian(today)?)
    }

    fn required(&self, field: &'static str, value: &str) -> Result<String, IntakeError> {
        self.optional(field, Some(value))?
            .ok_or_else(|| IntakeError::validation(field, "must not be empty"))
    }

    /// Trimmed value, `None` when blank, error when too long.
    fn optional(&self, field: &'static str, value: Option<&str>) -> Result<Option<String>, IntakeError> {
        let Some(value) = non_empty(value) else {
            return Ok(None);
        };
        if value.chars().count() > self.config.max_field_length {
            return Err(IntakeError::validation(
                field,
                format!("exceeds maximum length of {}", self.config.max_field_length),
            ));
        }
        Ok(Some(value.to_string()))
    }

    fn address(&self, address: &NewAddress) -> Result<AddressDraft, IntakeError> {
        Ok(AddressDraft {
            subject: self.required("subject", &address.subject)?,
            details: self.required("details", &address.details)?,
        })
    }

    fn addresses(&self, addresses: &[NewAddress]) -> Result<Vec<AddressDraft>, IntakeError> {
        addresses.iter().map(|address| self.address(address)).collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_gender(raw: &str) -> Result<Gender, IntakeError> {
    raw.parse()
        .map_err(|message: String| IntakeError::validation("gender", message))
}

fn canonical_date(raw: &str) -> Result<String, IntakeError> {
    JalaaliDate::parse(raw)
        .map(|date| date.to_string())
        .map_err(|err| IntakeError::validation("persian_date", err.to_string()))
}

/// Submits every row of a CSV file with columns
/// `first_name,last_name,gender,persian_date,phone_number`. Invalid rows are
/// logged and skipped.
pub async fn import_csv(service: &UserService, csv_path: &Path) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        first_name: String,
        last_name: String,
        gender: String,
        persian_date: Option<String>,
        phone_number: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(line, error = %err, "skipping unreadable csv row");
                continue;
            }
        };
        let user = NewUser {
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            gender: row.gender,
            persian_date: row.persian_date,
            addresses: Vec::new(),
        };

        match service.submit(user).await {
            Ok(_) => inserted += 1,
            Err(IntakeError::Store(err)) => return Err(err),
            Err(err) => warn!(line, error = %err, "skipping csv row"),
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::db::memory::MemoryUserStore;

    fn service() -> (Arc<MemoryUserStore>, UserService) {
        let store = Arc::new(MemoryUserStore::default());
        let service = UserService::new(store.clone(), IntakeConfig::default());
        (store, service)
    }

    fn new_user(gender: &str, persian_date: Option<&str>) -> NewUser {
        NewUser {
            first_name: " Sara ".to_string(),
            last_name: "Ahmadi".to_string(),
            phone_number: None,
            gender: gender.to_string(),
            persian_date: persian_date.map(str::to_string),
            addresses: vec![NewAddress {
                subject: "Home".to_string(),
                details: "Tehran".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn submit_normalizes_fields() {
        let (_, service) = service();
        let user = service
            .submit(new_user("female", Some("۱۴۰۳/۱/۵")))
            .await
            .unwrap();

        assert_eq!(user.first_name, "Sara");
        assert_eq!(user.gender, "Female");
        assert_eq!(user.persian_date.as_deref(), Some("1403/01/05"));
        assert_eq!(user.addresses.len(), 1);
    }

    #[tokio::test]
    async fn submit_stamps_today_when_date_missing() {
        let (_, service) = service();
        let user = service.submit(new_user("Male", None)).await.unwrap();
        let stamped = user.persian_date.unwrap();
        assert!(JalaaliDate::parse(&stamped).is_ok(), "{stamped}");
    }

    #[tokio::test]
    async fn submit_rejects_unknown_gender_and_bad_dates() {
        let (store, service) = service();

        let err = service.submit(new_user("Femail", None)).await.unwrap_err();
        assert!(matches!(err, IntakeError::Validation { field: "gender", .. }));

        let err = service
            .submit(new_user("Male", Some("1403/12/31")))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation { field: "persian_date", .. }));

        let mut blank = new_user("Male", None);
        blank.last_name = "   ".to_string();
        let err = service.submit(blank).await.unwrap_err();
        assert!(matches!(err, IntakeError::Validation { field: "last_name", .. }));

        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn submit_enforces_field_length() {
        let store = Arc::new(MemoryUserStore::default());
        let service = UserService::new(
            store,
            IntakeConfig {
                max_field_length: 3,
                ..IntakeConfig::default()
            },
        );
        let err = service.submit(new_user("Male", None)).await.unwrap_err();
        assert!(matches!(err, IntakeError::Validation { field: "first_name", .. }));
    }

    #[tokio::test]
    async fn edit_applies_only_non_empty_fields() {
        let (_, service) = service();
        let user = service
            .submit(new_user("Female", Some("1403/01/15")))
            .await
            .unwrap();

        let patch = UserPatch {
            first_name: Some("Sahar".to_string()),
            last_name: Some(String::new()),
            persian_date: Some("1403/02/01".to_string()),
            ..UserPatch::default()
        };
        let edited = service.edit(user.id, patch, Vec::new()).await.unwrap();

        assert_eq!(edited.first_name, "Sahar");
        assert_eq!(edited.last_name, "Ahmadi");
        assert_eq!(edited.persian_date.as_deref(), Some("1403/02/01"));
        assert_eq!(edited.addresses, user.addresses);
    }

    #[tokio::test]
    async fn edit_replaces_addresses_when_given() {
        let (_, service) = service();
        let user = service.submit(new_user("Male", None)).await.unwrap();

        let addresses = vec![
            NewAddress {
                subject: "Work".to_string(),
                details: "Shiraz".to_string(),
            },
            NewAddress {
                subject: "Other".to_string(),
                details: "Tabriz".to_string(),
            },
        ];
        let edited = service
            .edit(user.id, UserPatch::default(), addresses)
            .await
            .unwrap();
        let subjects: Vec<&str> = edited.addresses.iter().map(|a| a.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Work", "Other"]);
    }

    #[tokio::test]
    async fn deleted_users_disappear() {
        let (_, service) = service();
        let user = service.submit(new_user("Male", None)).await.unwrap();

        service.delete(user.id).await.unwrap();
        assert!(matches!(service.get(user.id).await, Err(IntakeError::NotFound("user"))));
        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(service.delete(user.id).await, Err(IntakeError::NotFound(_))));
    }

    #[tokio::test]
    async fn address_lifecycle() {
        let (_, service) = service();
        let user = service.submit(new_user("Male", None)).await.unwrap();

        let added = service
            .add_address(
                user.id,
                NewAddress {
                    subject: "Work".to_string(),
                    details: "Karaj".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(service.addresses_of(user.id).await.unwrap().len(), 2);

        let edited = service
            .edit_address(
                user.id,
                added.id,
                AddressPatch {
                    subject: None,
                    details: Some("Qazvin".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.subject, "Work");
        assert_eq!(edited.details, "Qazvin");

        service.delete_address(user.id, added.id).await.unwrap();
        assert!(matches!(
            service.delete_address(user.id, added.id).await,
            Err(IntakeError::NotFound("address"))
        ));
        assert!(matches!(
            service.add_address(Uuid::new_v4(), NewAddress {
                subject: "x".to_string(),
                details: "y".to_string(),
            })
            .await,
            Err(IntakeError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn users_in_month_matches_prefix() {
        let (_, service) = service();
        service.submit(new_user("Male", Some("1403/02/09"))).await.unwrap();
        service.submit(new_user("Female", Some("1403/12/09"))).await.unwrap();

        let found = service.users_in_month("1403", "2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].persian_date.as_deref(), Some("1403/02/09"));

        let found = service.users_in_month("۱۴۰۳", "۱۲").await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(service.users_in_month("1403", "13").await.is_err());
        assert!(service.users_in_month("year", "1").await.is_err());
    }

    #[tokio::test]
    async fn import_csv_skips_invalid_rows() {
        let (store, service) = service();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first_name,last_name,gender,persian_date,phone_number").unwrap();
        writeln!(file, "Sara,Ahmadi,Female,1403/01/15,09120000000").unwrap();
        writeln!(file, "Reza,Karimi,Femail,1403/01/15,").unwrap();
        writeln!(file, "Ali,Rahimi,Male,۱۴۰۳/۰۱/۱۶,").unwrap();
        writeln!(file, "Neda,Moradi,Female,1403/13/01,").unwrap();
        file.flush().unwrap();

        let inserted = import_csv(&service, file.path()).await.unwrap();
        assert_eq!(inserted, 2);

        let users = store.snapshot();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].phone_number.as_deref(), Some("09120000000"));
        assert_eq!(users[1].persian_date.as_deref(), Some("1403/01/16"));
    }

    #[tokio::test]
    async fn import_csv_continues_past_short_rows() {
        let (store, service) = service();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first_name,last_name,gender,persian_date,phone_number").unwrap();
        writeln!(file, "Sara,Ahmadi,Female,1403/01/15,").unwrap();
        writeln!(file, "Broken,Row").unwrap();
        writeln!(file, "Ali,Rahimi,Male,1403/01/16,").unwrap();
        file.flush().unwrap();

        let inserted = import_csv(&service, file.path()).await.unwrap();
        assert_eq!(inserted, 2);
        let names: Vec<String> = store.snapshot().into_iter().map(|u| u.first_name).collect();
        assert_eq!(names, vec!["Sara", "Ali"]);
    }

    #[tokio::test]
    async fn addresses_of_deleted_users_cannot_be_changed() {
        let (_, service) = service();
        let user = service.submit(new_user("Male", None)).await.unwrap();
        let address_id = user.addresses[0].id;
        service.delete(user.id).await.unwrap();

        let patch = AddressPatch {
            subject: Some("X".to_string()),
            details: None,
        };
        assert!(matches!(
            service.edit_address(user.id, address_id, patch).await,
            Err(IntakeError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_address(user.id, address_id).await,
            Err(IntakeError::NotFound(_))
        ));
    }
}
