use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use crate::error::SyncError;
use crate::model::{AnimalKind, City, ReferenceEntity, ShelterPost, Town};
use crate::sink::BulkUpsertSink;

/// Code-keyed upserts into the reference tables, one transaction per batch.
#[derive(Debug, Clone)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BulkUpsertSink for SqliteSink {
    #[instrument(skip_all, fields(records = records.len()))]
    async fn upsert_batch(&self, records: &[ReferenceEntity]) -> Result<(), SyncError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            match record {
                ReferenceEntity::AnimalKind(kind) => upsert_animal_kind(&mut tx, kind).await?,
                ReferenceEntity::City(city) => upsert_city(&mut tx, city).await?,
                ReferenceEntity::Town(town) => upsert_town(&mut tx, town).await?,
                ReferenceEntity::ShelterPost(post) => upsert_shelter_post(&mut tx, post).await?,
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn upsert_animal_kind(
    tx: &mut Transaction<'_, Sqlite>,
    kind: &AnimalKind,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO animal_kinds (code, name, animal_code) VALUES (?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            animal_code = excluded.animal_code,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(&kind.code)
    .bind(&kind.name)
    .bind(&kind.animal_code)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_city(tx: &mut Transaction<'_, Sqlite>, city: &City) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO cities (code, name) VALUES (?, ?)
         ON CONFLICT(code) DO UPDATE SET name = excluded.name, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(&city.code)
    .bind(&city.name)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_town(tx: &mut Transaction<'_, Sqlite>, town: &Town) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO towns (code, name, city_code) VALUES (?, ?, ?)
         ON CONFLICT(code) DO UPDATE SET
            name = excluded.name,
            city_code = excluded.city_code,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(&town.code)
    .bind(&town.name)
    .bind(&town.parent_city_code)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// City, town and breed codes are resolved from the denormalised names
/// against rows written by earlier stages; unknown names stay NULL.
async fn upsert_shelter_post(
    tx: &mut Transaction<'_, Sqlite>,
    post: &ShelterPost,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO shelter_posts (
            external_id, found_date, found_place, city_name, town_name,
            city_code, town_code,
            animal_name, animal_kind_name, animal_kind_code,
            age, sex, color, weight, notice_number, image_url, status, neutered, feature,
            shelter_name, shelter_telephone, shelter_address
         ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            (SELECT code FROM cities WHERE name = ?4 LIMIT 1),
            (SELECT t.code FROM towns t JOIN cities c ON c.code = t.city_code
              WHERE c.name = ?4 AND t.name = ?5 LIMIT 1),
            ?6, ?7,
            (SELECT k.code FROM animal_kinds k JOIN animals a ON a.code = k.animal_code
              WHERE k.name = ?7 AND (?6 IS NULL OR a.name = ?6) LIMIT 1),
            ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19
         )
         ON CONFLICT(external_id) DO UPDATE SET
            found_date = excluded.found_date,
            found_place = excluded.found_place,
            city_name = excluded.city_name,
            town_name = excluded.town_name,
            city_code = excluded.city_code,
            town_code = excluded.town_code,
            animal_name = excluded.animal_name,
            animal_kind_name = excluded.animal_kind_name,
            animal_kind_code = excluded.animal_kind_code,
            age = excluded.age,
            sex = excluded.sex,
            color = excluded.color,
            weight = excluded.weight,
            notice_number = excluded.notice_number,
            image_url = excluded.image_url,
            status = excluded.status,
            neutered = excluded.neutered,
            feature = excluded.feature,
            shelter_name = excluded.shelter_name,
            shelter_telephone = excluded.shelter_telephone,
            shelter_address = excluded.shelter_address,
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(&post.external_id)
    .bind(post.found_date)
    .bind(&post.found_place)
    .bind(&post.city_name)
    .bind(&post.town_name)
    .bind(&post.animal_name)
    .bind(&post.animal_kind_name)
    .bind(&post.age)
    .bind(&post.sex)
    .bind(&post.color)
    .bind(&post.weight)
    .bind(&post.notice_number)
    .bind(&post.image_url)
    .bind(&post.status)
    .bind(&post.neutered)
    .bind(&post.feature)
    .bind(&post.shelter_name)
    .bind(&post.shelter_telephone)
    .bind(&post.shelter_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
