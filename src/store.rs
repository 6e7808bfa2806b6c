//! JSON-file persistence for the counter and the daily rollover.

use crate::errors::StoreError;
use crate::models::{CounterRecord, SchemaVersion, StoredRecord};
use crate::time::chile_today;
use chrono::{DateTime, NaiveDate, Utc};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollover {
    pub record: CounterRecord,
    pub increments_applied: u64,
}

/// Result of an admin mutation: the count before the change and the saved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminChange {
    pub previous: u64,
    pub record: CounterRecord,
}

#[derive(Debug)]
pub struct CounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record, repairing or recreating the file as needed. Never fails.
    pub async fn load(&self) -> CounterRecord {
        let _guard = self.lock.lock().await;
        self.load_at(Utc::now()).await
    }

    pub async fn save(&self, record: &CounterRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_record(record).await
    }

    /// Adds one to the count for every Chile day elapsed since the last rollover.
    pub async fn ensure_daily_increment(
        &self,
        reference: Option<DateTime<Utc>>,
    ) -> Result<Rollover, StoreError> {
        let _guard = self.lock.lock().await;
        let now = reference.unwrap_or_else(Utc::now);
        let mut record = self.load_at(now).await;
        let today = chile_today(now);

        let increments_applied = elapsed_chile_days(record.last_run_chile_date, today);
        if increments_applied > 0 {
            record.dias_sin_accidentes = record
                .dias_sin_accidentes
                .saturating_add(increments_applied);
            record.last_run_chile_date = today;
            record.ultima_actualizacion = now;
            self.write_record(&record).await?;
            info!(
                increments_applied,
                dias = record.dias_sin_accidentes,
                "applied daily rollover"
            );
        }

        Ok(Rollover {
            record,
            increments_applied,
        })
    }

    // The rollover date is stamped to today so the edited day is not counted again.
    pub async fn apply_update(
        &self,
        dias: u64,
        record_anterior: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<AdminChange, StoreError> {
        let _guard = self.lock.lock().await;
        let mut record = self.load_at(now).await;
        let previous = record.dias_sin_accidentes;

        record.dias_sin_accidentes = dias;
        if let Some(value) = record_anterior {
            record.record_anterior = Some(value);
        }
        stamp(&mut record, now);
        self.write_record(&record).await?;

        Ok(AdminChange { previous, record })
    }

    pub async fn apply_reset(&self, now: DateTime<Utc>) -> Result<AdminChange, StoreError> {
        let _guard = self.lock.lock().await;
        let mut record = self.load_at(now).await;
        let previous = record.dias_sin_accidentes;

        record.dias_sin_accidentes = 0;
        stamp(&mut record, now);
        self.write_record(&record).await?;

        Ok(AdminChange { previous, record })
    }

    pub async fn backup(&self, now: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        let _guard = self.lock.lock().await;
        let timestamp = crate::models::format_instant(now).replace([':', '.'], "-");
        let target = self.sibling(&format!(".bak.{timestamp}"));
        fs::copy(&self.path, &target).await?;
        Ok(target)
    }

    async fn load_at(&self, now: DateTime<Utc>) -> CounterRecord {
        let stored = match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<StoredRecord>(&bytes) {
                Ok(stored) => Some(stored),
                Err(err) => {
                    error!("failed to parse data file, starting from zero: {err}");
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no data file at {}, creating one", self.path.display());
                None
            }
            Err(err) => {
                error!("failed to read data file, starting from zero: {err}");
                None
            }
        };

        let Some(stored) = stored else {
            let record = CounterRecord::new(now);
            self.persist_best_effort(&record).await;
            return record;
        };

        let migration = stored.migrate(now);
        if migration.rewritten {
            if migration.from == SchemaVersion::Legacy {
                info!(
                    last_run_chile_date = %migration.record.last_run_chile_date,
                    "migrated legacy counter record"
                );
            }
            self.persist_best_effort(&migration.record).await;
        }
        migration.record
    }

    async fn persist_best_effort(&self, record: &CounterRecord) {
        if let Err(err) = self.write_record(record).await {
            warn!("could not persist repaired counter record: {err}");
        }
    }

    async fn write_record(&self, record: &CounterRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let payload = serde_json::to_vec_pretty(&StoredRecord::from(record))?;
        let tmp_path = self.sibling(".tmp");
        fs::write(&tmp_path, payload).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Whole calendar days from `from` to `to`, never negative.
pub fn elapsed_chile_days(from: NaiveDate, to: NaiveDate) -> u64 {
    u64::try_from((to - from).num_days()).unwrap_or(0)
}

fn stamp(record: &mut CounterRecord, now: DateTime<Utc>) {
    record.ultima_actualizacion = now;
    record.last_run_chile_date = chile_today(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daytime_in_chile(day: NaiveDate) -> DateTime<Utc> {
        // 15:00 UTC lands on the same Santiago date under either offset.
        Utc.from_utc_datetime(&day.and_hms_opt(15, 0, 0).unwrap())
    }

    fn store_in(dir: &TempDir) -> CounterStore {
        CounterStore::new(dir.path().join("data.json"))
    }

    fn write_json(store: &CounterStore, value: serde_json::Value) {
        std::fs::write(store.path(), serde_json::to_vec_pretty(&value).unwrap()).unwrap();
    }

    fn read_json(store: &CounterStore) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn elapsed_days_counts_calendar_days() {
        assert_eq!(elapsed_chile_days(date(2025, 3, 10), date(2025, 3, 11)), 1);
        assert_eq!(elapsed_chile_days(date(2025, 3, 10), date(2025, 3, 10)), 0);
        assert_eq!(elapsed_chile_days(date(2025, 3, 11), date(2025, 3, 10)), 0);
        assert_eq!(elapsed_chile_days(date(2025, 2, 27), date(2025, 3, 2)), 3);
    }

    #[test]
    fn one_minute_across_midnight_is_one_day() {
        let before = Utc.with_ymd_and_hms(2025, 3, 11, 2, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 11, 3, 1, 0).unwrap();
        assert_eq!(elapsed_chile_days(chile_today(before), chile_today(after)), 1);
    }

    #[tokio::test]
    async fn missing_file_loads_a_persisted_default() {
        let dir = TempDir::new().unwrap();
        let store = CounterStore::new(dir.path().join("nested").join("data.json"));

        let record = store.load().await;
        assert_eq!(record.dias_sin_accidentes, 0);
        assert_eq!(record.last_run_chile_date, chile_today(Utc::now()));
        assert!(store.path().exists());

        let again = CounterStore::new(store.path()).load().await;
        assert_eq!(again.dias_sin_accidentes, 0);
        assert_eq!(again.last_run_chile_date, record.last_run_chile_date);
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_with_default() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"{ not json").unwrap();

        let record = store.load().await;
        assert_eq!(record.dias_sin_accidentes, 0);
        assert_eq!(read_json(&store)["diasSinAccidentes"], 0);
    }

    #[tokio::test]
    async fn legacy_file_is_migrated_on_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 9,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z",
                "ultimoIncremento": "2025-03-08"
            }),
        );

        let record = store.load().await;
        assert_eq!(record.dias_sin_accidentes, 9);
        assert_eq!(record.last_run_chile_date, date(2025, 3, 8));
        assert_eq!(read_json(&store)["lastRunChileDate"], "2025-03-08");
    }

    #[tokio::test]
    async fn numeric_legacy_timestamp_keeps_the_count() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 120,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z",
                "ultimoIncremento": 1741600000000u64
            }),
        );

        let record = store.load().await;
        assert_eq!(record.dias_sin_accidentes, 120);
        assert_eq!(record.last_run_chile_date, date(2025, 3, 10));

        let json = read_json(&store);
        assert_eq!(json["diasSinAccidentes"], 120);
        assert_eq!(json["lastRunChileDate"], "2025-03-10");
    }

    #[tokio::test]
    async fn string_previous_record_keeps_the_count() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 120,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z",
                "lastRunChileDate": "2025-03-08",
                "recordAnterior": "40",
                "planta": "Norte"
            }),
        );

        let record = store.load().await;
        assert_eq!(record.dias_sin_accidentes, 120);
        assert_eq!(record.record_anterior, Some(40));

        let json = read_json(&store);
        assert_eq!(json["diasSinAccidentes"], 120);
        assert_eq!(json["recordAnterior"], 40);
        assert_eq!(json["planta"], "Norte");
    }

    #[tokio::test]
    async fn save_mirrors_legacy_field() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut record = CounterRecord::new(daytime_in_chile(date(2025, 3, 10)));
        record.dias_sin_accidentes = 4;
        record.record_anterior = Some(30);

        store.save(&record).await.unwrap();

        let json = read_json(&store);
        assert_eq!(json["diasSinAccidentes"], 4);
        assert_eq!(json["lastRunChileDate"], "2025-03-10");
        assert_eq!(json["ultimoIncremento"], "2025-03-10");
        assert_eq!(json["recordAnterior"], 30);
        assert!(!dir.path().join("data.json.tmp").exists());
    }

    #[tokio::test]
    async fn save_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = CounterStore::new(blocker.join("data.json"));

        let result = store.save(&CounterRecord::new(Utc::now())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn same_day_rollover_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let today = chile_today(Utc::now());
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 10,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z",
                "lastRunChileDate": today.format("%Y-%m-%d").to_string()
            }),
        );

        for _ in 0..3 {
            let rollover = store.ensure_daily_increment(None).await.unwrap();
            assert_eq!(rollover.increments_applied, 0);
            assert_eq!(rollover.record.dias_sin_accidentes, 10);
            assert_eq!(rollover.record.last_run_chile_date, today);
        }
        assert_eq!(store.load().await.dias_sin_accidentes, 10);
    }

    #[tokio::test]
    async fn rollover_catches_up_missed_days() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let today = chile_today(Utc::now());
        let two_days_ago = today.checked_sub_days(Days::new(2)).unwrap();
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 5,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z",
                "lastRunChileDate": two_days_ago.format("%Y-%m-%d").to_string()
            }),
        );

        let rollover = store.ensure_daily_increment(None).await.unwrap();
        assert_eq!(rollover.increments_applied, 2);
        assert_eq!(rollover.record.dias_sin_accidentes, 7);
        assert_eq!(rollover.record.last_run_chile_date, today);

        let persisted = store.load().await;
        assert_eq!(persisted.dias_sin_accidentes, 7);
        assert_eq!(persisted.last_run_chile_date, today);
    }

    #[tokio::test]
    async fn rollover_follows_the_reference_instant() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let start = daytime_in_chile(date(2025, 3, 10));
        store.save(&CounterRecord::new(start)).await.unwrap();

        let later = daytime_in_chile(date(2025, 3, 14));
        let rollover = store.ensure_daily_increment(Some(later)).await.unwrap();
        assert_eq!(rollover.increments_applied, 4);
        assert_eq!(rollover.record.last_run_chile_date, date(2025, 3, 14));
        assert_eq!(rollover.record.ultima_actualizacion, later);

        let repeat = store.ensure_daily_increment(Some(later)).await.unwrap();
        assert_eq!(repeat.increments_applied, 0);
        assert_eq!(repeat.record.dias_sin_accidentes, 4);
    }

    #[tokio::test]
    async fn first_observation_never_increments() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_json(
            &store,
            serde_json::json!({
                "diasSinAccidentes": 3,
                "ultimaActualizacion": "2025-03-08T10:00:00.000Z"
            }),
        );

        let rollover = store.ensure_daily_increment(None).await.unwrap();
        assert_eq!(rollover.increments_applied, 0);
        assert_eq!(rollover.record.dias_sin_accidentes, 3);
        assert_eq!(rollover.record.last_run_chile_date, chile_today(Utc::now()));
    }

    #[tokio::test]
    async fn admin_update_stamps_today_and_keeps_record_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut record = CounterRecord::new(daytime_in_chile(date(2025, 3, 1)));
        record.dias_sin_accidentes = 20;
        record.record_anterior = Some(55);
        store.save(&record).await.unwrap();

        let now = daytime_in_chile(date(2025, 3, 10));
        let change = store.apply_update(12, None, now).await.unwrap();
        assert_eq!(change.previous, 20);
        assert_eq!(change.record.dias_sin_accidentes, 12);
        assert_eq!(change.record.record_anterior, Some(55));
        assert_eq!(change.record.last_run_chile_date, date(2025, 3, 10));

        let rollover = store.ensure_daily_increment(Some(now)).await.unwrap();
        assert_eq!(rollover.increments_applied, 0);
        assert_eq!(rollover.record.dias_sin_accidentes, 12);

        let change = store.apply_update(13, Some(60), now).await.unwrap();
        assert_eq!(change.record.record_anterior, Some(60));
    }

    #[tokio::test]
    async fn admin_reset_zeroes_the_count() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut record = CounterRecord::new(daytime_in_chile(date(2025, 3, 1)));
        record.dias_sin_accidentes = 8;
        store.save(&record).await.unwrap();

        let now = daytime_in_chile(date(2025, 3, 10));
        let change = store.apply_reset(now).await.unwrap();
        assert_eq!(change.previous, 8);
        assert_eq!(change.record.dias_sin_accidentes, 0);
        assert_eq!(change.record.last_run_chile_date, date(2025, 3, 10));
        assert_eq!(read_json(&store)["diasSinAccidentes"], 0);
    }

    #[tokio::test]
    async fn backup_copies_the_data_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&CounterRecord::new(Utc::now())).await.unwrap();

        let now = Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap();
        let target = store.backup(now).await.unwrap();
        assert_eq!(
            target.file_name().unwrap(),
            "data.json.bak.2025-03-10T15-30-00-000Z"
        );
        assert_eq!(
            std::fs::read(&target).unwrap(),
            std::fs::read(store.path()).unwrap()
        );
    }
}
