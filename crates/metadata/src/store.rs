//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CapabilityRepo, HierarchyRepo, MemberRepo, TempFileRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    HierarchyRepo + CapabilityRepo + TempFileRepo + MemberRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store. A path of `:memory:` opens a private
    /// in-memory database that lives as long as the store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600); // 10 minutes default
        let in_memory = path == Path::new(":memory:");

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        }
        .foreign_keys(true)
        // Prevent transient "database is locked" errors under concurrent access.
        .busy_timeout(Duration::from_secs(5));

        // SQLite permits limited write concurrency; a single connection also
        // serializes transactions, which the hierarchy invariants rely on.
        let mut pool_opts = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(query_timeout_secs));
        if in_memory {
            // The database disappears with its last connection.
            pool_opts = pool_opts
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(
            path = %path.display(),
            query_timeout_secs = query_timeout_secs,
            "SQLite metadata store opened"
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use loft_core::{
        Capability, CapabilitySet, FileType, SpecialContainer, UploadState, validate_file_name,
    };
    use sqlx::{QueryBuilder, SqliteConnection};
    use std::collections::BTreeSet;
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Upper bound on bound parameters per `IN (...)` list.
    const MAX_BIND_BATCH: usize = 500;

    const FILE_SELECT: &str = "SELECT f.id, f.file_key, f.owner_id, f.file_name, f.file_type, \
         i.byte_size, i.create_date, i.update_date, p.path \
         FROM files f \
         JOIN file_infos i ON i.file_id = f.id \
         JOIN file_paths p ON p.file_id = f.id";

    fn encode_path(path: &[i64]) -> MetadataResult<String> {
        Ok(serde_json::to_string(path)?)
    }

    async fn fetch_file(
        conn: &mut SqliteConnection,
        file_id: i64,
    ) -> MetadataResult<Option<FileRecord>> {
        let sql = format!("{FILE_SELECT} WHERE f.id = ?");
        let row = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(file_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    async fn fetch_file_by_key(
        conn: &mut SqliteConnection,
        file_key: Uuid,
    ) -> MetadataResult<Option<FileRecord>> {
        let sql = format!("{FILE_SELECT} WHERE f.file_key = ?");
        let row = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(file_key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    async fn fetch_parent_ids(conn: &mut SqliteConnection, child_id: i64) -> MetadataResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT parent_id FROM file_closures WHERE child_id = ?")
            .bind(child_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(ids)
    }

    async fn fetch_child_by_name(
        conn: &mut SqliteConnection,
        parent_id: i64,
        file_name: &str,
    ) -> MetadataResult<Option<FileRecord>> {
        let sql = format!(
            "{FILE_SELECT} JOIN file_closures c ON c.child_id = f.id \
             WHERE c.parent_id = ? AND f.file_name = ?"
        );
        let row = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(parent_id)
            .bind(file_name)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row)
    }

    /// Direct children of every id in `parent_ids`.
    async fn fetch_children_of(
        conn: &mut SqliteConnection,
        parent_ids: &[i64],
    ) -> MetadataResult<Vec<FileRecord>> {
        let mut out = Vec::new();
        for batch in parent_ids.chunks(MAX_BIND_BATCH) {
            let mut qb = QueryBuilder::<Sqlite>::new(FILE_SELECT);
            qb.push(" JOIN file_closures c ON c.child_id = f.id WHERE c.parent_id IN (");
            let mut ids = qb.separated(", ");
            for id in batch {
                ids.push_bind(*id);
            }
            ids.push_unseparated(") ORDER BY f.file_name, f.id");
            let rows = qb
                .build_query_as::<FileRecord>()
                .fetch_all(&mut *conn)
                .await?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Run `<select_prefix> IN (<ids>)` in batches and collect the id column.
    async fn select_ids_in(
        conn: &mut SqliteConnection,
        select_prefix: &str,
        ids: &[i64],
    ) -> MetadataResult<Vec<i64>> {
        let mut out = Vec::new();
        for batch in ids.chunks(MAX_BIND_BATCH) {
            let mut qb = QueryBuilder::<Sqlite>::new(select_prefix);
            qb.push(" IN (");
            let mut sep = qb.separated(", ");
            for id in batch {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
            let rows: Vec<i64> = qb.build_query_scalar().fetch_all(&mut *conn).await?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Whether `file_name` is already used at the given level of the owner's
    /// forest. `parent_id = None` means the parentless (root) level.
    async fn name_taken(
        conn: &mut SqliteConnection,
        owner_id: i64,
        parent_id: Option<i64>,
        file_name: &str,
        exclude_id: Option<i64>,
    ) -> MetadataResult<bool> {
        let existing: Vec<i64> = match parent_id {
            Some(parent_id) => {
                sqlx::query_scalar(
                    "SELECT f.id FROM files f JOIN file_closures c ON c.child_id = f.id \
                     WHERE c.parent_id = ? AND f.file_name = ?",
                )
                .bind(parent_id)
                .bind(file_name)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT f.id FROM files f JOIN file_paths p ON p.file_id = f.id \
                     WHERE f.owner_id = ? AND f.file_name = ? AND p.path = '[]'",
                )
                .bind(owner_id)
                .bind(file_name)
                .fetch_all(&mut *conn)
                .await?
            }
        };
        Ok(existing.into_iter().any(|id| Some(id) != exclude_id))
    }

    async fn upsert_grant(
        conn: &mut SqliteConnection,
        member_id: i64,
        file_id: i64,
        capabilities: &CapabilitySet,
        now: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO file_capabilities (member_id, file_id, capabilities, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(member_id, file_id) DO UPDATE SET
                capabilities = excluded.capabilities,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(member_id)
        .bind(file_id)
        .bind(serde_json::to_string(capabilities)?)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            MetadataError::from_write(e, format!("grant for member {member_id} on file {file_id}"))
        })?;
        Ok(())
    }

    /// Insert a node and every row that belongs to it. Callers own the
    /// transaction; an error leaves it to be rolled back.
    async fn insert_node(
        conn: &mut SqliteConnection,
        node: &NewNode,
        now: OffsetDateTime,
    ) -> MetadataResult<FileRecord> {
        validate_file_name(&node.file_name)?;

        match (node.file_type, node.link_target) {
            (FileType::Link, None) => {
                return Err(MetadataError::InvalidParent(
                    "link node requires a target".to_string(),
                ));
            }
            (FileType::Container | FileType::Block, Some(_)) => {
                return Err(MetadataError::InvalidParent(format!(
                    "{} node cannot carry a link target",
                    node.file_type
                )));
            }
            _ => {}
        }

        let path = match node.parent_id {
            Some(parent_id) => {
                let parent = fetch_file(conn, parent_id)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("parent file {parent_id}")))?;
                if !parent.is_container() {
                    return Err(MetadataError::InvalidParent(format!(
                        "file {parent_id} is a {}, not a container",
                        parent.file_type
                    )));
                }
                parent.child_path()?
            }
            None => Vec::new(),
        };

        if name_taken(conn, node.owner_id, node.parent_id, &node.file_name, None).await? {
            return Err(MetadataError::AlreadyExists(format!(
                "'{}' already exists in {}",
                node.file_name,
                node.parent_id
                    .map(|id| format!("container {id}"))
                    .unwrap_or_else(|| format!("root level of member {}", node.owner_id))
            )));
        }

        if let Some(target_id) = node.link_target
            && fetch_file(conn, target_id).await?.is_none()
        {
            return Err(MetadataError::NotFound(format!("link target {target_id}")));
        }

        let file_key = node.file_key.unwrap_or_else(Uuid::new_v4);
        let file_id = sqlx::query(
            "INSERT INTO files (file_key, owner_id, file_name, file_type) VALUES (?, ?, ?, ?)",
        )
        .bind(file_key)
        .bind(node.owner_id)
        .bind(&node.file_name)
        .bind(node.file_type.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| MetadataError::from_write(e, format!("file_key {file_key}")))?
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO file_infos (file_id, byte_size, create_date, update_date) VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(node.byte_size)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO file_paths (file_id, path) VALUES (?, ?)")
            .bind(file_id)
            .bind(encode_path(&path)?)
            .execute(&mut *conn)
            .await?;

        if let Some(parent_id) = node.parent_id {
            sqlx::query("INSERT INTO file_closures (parent_id, child_id) VALUES (?, ?)")
                .bind(parent_id)
                .bind(file_id)
                .execute(&mut *conn)
                .await?;
        }

        if let Some(target_id) = node.link_target {
            sqlx::query("INSERT INTO file_links (file_id, target_id) VALUES (?, ?)")
                .bind(file_id)
                .bind(target_id)
                .execute(&mut *conn)
                .await?;
        }

        for (member_id, capabilities) in &node.grants {
            upsert_grant(conn, *member_id, file_id, capabilities, now).await?;
        }

        fetch_file(conn, file_id).await?.ok_or_else(|| {
            MetadataError::Inconsistent(format!("file {file_id} vanished after insert"))
        })
    }

    /// Move `file_id` under `new_parent_id`: rewrite its closure edge and the
    /// paths of its whole subtree.
    async fn move_node(
        conn: &mut SqliteConnection,
        file_id: i64,
        new_parent_id: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        let file = fetch_file(&mut *conn, file_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("file {file_id}")))?;
        let new_parent = fetch_file(&mut *conn, new_parent_id)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("parent file {new_parent_id}")))?;

        if !new_parent.is_container() {
            return Err(MetadataError::InvalidParent(format!(
                "file {new_parent_id} is a {}, not a container",
                new_parent.file_type
            )));
        }

        let parent_ids = fetch_parent_ids(&mut *conn, file_id).await?;
        match parent_ids.as_slice() {
            [_] => {}
            [] if file.path_ids()?.is_empty() => {
                return Err(MetadataError::InvalidMove(format!(
                    "file {file_id} is a root container"
                )));
            }
            [] => {
                return Err(MetadataError::Inconsistent(format!(
                    "file {file_id} has a non-empty path but no closure row"
                )));
            }
            many => {
                return Err(MetadataError::Inconsistent(format!(
                    "file {file_id} has {} parent closure rows",
                    many.len()
                )));
            }
        }

        let new_path = new_parent.child_path()?;
        if new_parent_id == file_id || new_path.contains(&file_id) {
            return Err(MetadataError::InvalidMove(format!(
                "cannot move file {file_id} below itself"
            )));
        }

        if name_taken(
            &mut *conn,
            file.owner_id,
            Some(new_parent_id),
            &file.file_name,
            Some(file_id),
        )
        .await?
        {
            return Err(MetadataError::AlreadyExists(format!(
                "'{}' already exists in container {new_parent_id}",
                file.file_name
            )));
        }

        sqlx::query("UPDATE file_closures SET parent_id = ? WHERE child_id = ?")
            .bind(new_parent_id)
            .bind(file_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("UPDATE file_infos SET update_date = ? WHERE file_id = ?")
            .bind(updated_at)
            .bind(file_id)
            .execute(&mut *conn)
            .await?;

        // Rewrite the path of the moved node and every descendant.
        let mut queue = vec![(file_id, new_path)];
        while let Some((id, path)) = queue.pop() {
            sqlx::query("UPDATE file_paths SET path = ? WHERE file_id = ?")
                .bind(encode_path(&path)?)
                .bind(id)
                .execute(&mut *conn)
                .await?;

            let children: Vec<i64> =
                sqlx::query_scalar("SELECT child_id FROM file_closures WHERE parent_id = ?")
                    .bind(id)
                    .fetch_all(&mut *conn)
                    .await?;
            if !children.is_empty() {
                let mut child_path = path;
                child_path.push(id);
                for child_id in children {
                    queue.push((child_id, child_path.clone()));
                }
            }
        }
        Ok(())
    }

    async fn fetch_special_container(
        conn: &mut SqliteConnection,
        owner_id: i64,
        kind: SpecialContainer,
    ) -> MetadataResult<FileRecord> {
        let path = if kind.is_under_root() {
            let root = find_special(conn, owner_id, SpecialContainer::Root, &[]).await?;
            vec![root.id]
        } else {
            Vec::new()
        };
        find_special(conn, owner_id, kind, &path).await
    }

    async fn find_special(
        conn: &mut SqliteConnection,
        owner_id: i64,
        kind: SpecialContainer,
        path: &[i64],
    ) -> MetadataResult<FileRecord> {
        let sql = format!("{FILE_SELECT} WHERE f.owner_id = ? AND f.file_name = ? AND p.path = ?");
        let mut matches = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(owner_id)
            .bind(kind.name())
            .bind(encode_path(path)?)
            .fetch_all(&mut *conn)
            .await?;

        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(MetadataError::Inconsistent(format!(
                "member {owner_id} has no {kind} container"
            ))),
            n => Err(MetadataError::Inconsistent(format!(
                "member {owner_id} has {n} {kind} containers"
            ))),
        }
    }

    /// Ids of `root_id` and all of its descendants.
    async fn collect_subtree(
        conn: &mut SqliteConnection,
        root_id: i64,
    ) -> MetadataResult<BTreeSet<i64>> {
        let mut seen = BTreeSet::from([root_id]);
        let mut frontier = vec![root_id];
        while !frontier.is_empty() {
            let children = select_ids_in(
                conn,
                "SELECT child_id FROM file_closures WHERE parent_id",
                &frontier,
            )
            .await?;
            frontier = children.into_iter().filter(|id| seen.insert(*id)).collect();
        }
        Ok(seen)
    }

    /// Grow `doomed` with every link (and its subtree) whose target is in it.
    async fn expand_with_links(
        conn: &mut SqliteConnection,
        doomed: &mut BTreeSet<i64>,
    ) -> MetadataResult<()> {
        loop {
            let ids: Vec<i64> = doomed.iter().copied().collect();
            let links = select_ids_in(
                conn,
                "SELECT file_id FROM file_links WHERE target_id",
                &ids,
            )
            .await?;
            let fresh: Vec<i64> = links.into_iter().filter(|id| !doomed.contains(id)).collect();
            if fresh.is_empty() {
                return Ok(());
            }
            for link_id in fresh {
                let subtree = collect_subtree(conn, link_id).await?;
                doomed.extend(subtree);
            }
        }
    }

    /// Delete files by id; dependent rows go with them via ON DELETE CASCADE.
    async fn delete_files(conn: &mut SqliteConnection, ids: &BTreeSet<i64>) -> MetadataResult<u64> {
        let ids: Vec<i64> = ids.iter().copied().collect();
        let mut removed = 0;
        for batch in ids.chunks(MAX_BIND_BATCH) {
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM files WHERE id IN (");
            let mut sep = qb.separated(", ");
            for id in batch {
                sep.push_bind(*id);
            }
            sep.push_unseparated(")");
            removed += qb.build().execute(&mut *conn).await?.rows_affected();
        }
        Ok(removed)
    }

    #[async_trait]
    impl HierarchyRepo for SqliteStore {
        async fn create_node(&self, node: &NewNode) -> MetadataResult<FileRecord> {
            let now = OffsetDateTime::now_utc();
            let mut tx = self.pool.begin().await?;
            let record = insert_node(&mut tx, node, now).await?;
            tx.commit().await?;
            Ok(record)
        }

        async fn get_file(&self, file_id: i64) -> MetadataResult<Option<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            fetch_file(&mut conn, file_id).await
        }

        async fn get_file_by_key(&self, file_key: Uuid) -> MetadataResult<Option<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            fetch_file_by_key(&mut conn, file_key).await
        }

        async fn get_parent(&self, file_id: i64) -> MetadataResult<FileRecord> {
            let mut conn = self.pool.acquire().await?;
            let file = fetch_file(&mut conn, file_id)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("file {file_id}")))?;
            let parent_ids = fetch_parent_ids(&mut conn, file_id).await?;
            match parent_ids.as_slice() {
                [parent_id] => fetch_file(&mut conn, *parent_id).await?.ok_or_else(|| {
                    MetadataError::Inconsistent(format!(
                        "closure row of file {file_id} points at missing parent {parent_id}"
                    ))
                }),
                [] if file.path_ids()?.is_empty() => Err(MetadataError::NotFound(format!(
                    "file {file_id} is a root and has no parent"
                ))),
                [] => Err(MetadataError::Inconsistent(format!(
                    "file {file_id} has a non-empty path but no closure row"
                ))),
                many => Err(MetadataError::Inconsistent(format!(
                    "file {file_id} has {} parent closure rows",
                    many.len()
                ))),
            }
        }

        async fn get_children(&self, file_id: i64) -> MetadataResult<Vec<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            fetch_children_of(&mut conn, &[file_id]).await
        }

        async fn get_child_by_name(
            &self,
            parent_id: i64,
            file_name: &str,
        ) -> MetadataResult<Option<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            fetch_child_by_name(&mut conn, parent_id, file_name).await
        }

        async fn find_descendants_by_name(
            &self,
            file_id: i64,
            file_name: &str,
            max_depth: u32,
        ) -> MetadataResult<Vec<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            if fetch_file(&mut conn, file_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("file {file_id}")));
            }

            let mut frontier = vec![file_id];
            for _ in 0..max_depth {
                if frontier.is_empty() {
                    break;
                }
                let level = fetch_children_of(&mut conn, &frontier).await?;
                let matches: Vec<FileRecord> = level
                    .iter()
                    .filter(|f| f.file_name == file_name)
                    .cloned()
                    .collect();
                if !matches.is_empty() {
                    return Ok(matches);
                }
                frontier = level
                    .into_iter()
                    .filter(|f| f.is_container())
                    .map(|f| f.id)
                    .collect();
            }
            Ok(Vec::new())
        }

        async fn reparent(
            &self,
            file_id: i64,
            new_parent_id: i64,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;
            move_node(&mut tx, file_id, new_parent_id, updated_at).await?;
            tx.commit().await?;
            Ok(())
        }

        async fn reparent_to_special(
            &self,
            file_id: i64,
            owner_id: i64,
            kind: SpecialContainer,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<FileRecord> {
            let mut tx = self.pool.begin().await?;
            let container = fetch_special_container(&mut tx, owner_id, kind).await?;
            move_node(&mut tx, file_id, container.id, updated_at).await?;
            tx.commit().await?;
            Ok(container)
        }

        async fn rename(
            &self,
            file_id: i64,
            file_name: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            validate_file_name(file_name)?;
            let mut tx = self.pool.begin().await?;

            let file = fetch_file(&mut tx, file_id)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("file {file_id}")))?;
            let parent_id = fetch_parent_ids(&mut tx, file_id).await?.first().copied();

            if name_taken(&mut tx, file.owner_id, parent_id, file_name, Some(file_id)).await? {
                return Err(MetadataError::AlreadyExists(format!(
                    "'{file_name}' already exists next to file {file_id}"
                )));
            }

            sqlx::query("UPDATE files SET file_name = ? WHERE id = ?")
                .bind(file_name)
                .bind(file_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE file_infos SET update_date = ? WHERE file_id = ?")
                .bind(updated_at)
                .bind(file_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn delete_subtree(&self, file_id: i64) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;
            if fetch_file(&mut tx, file_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("file {file_id}")));
            }

            let mut doomed = collect_subtree(&mut tx, file_id).await?;
            expand_with_links(&mut tx, &mut doomed).await?;
            let removed = delete_files(&mut tx, &doomed).await?;

            tx.commit().await?;
            Ok(removed)
        }

        async fn delete_owner_files(&self, owner_id: i64) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM temp_files WHERE owner_id = ?")
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM file_capabilities WHERE member_id = ?")
                .bind(owner_id)
                .execute(&mut *tx)
                .await?;

            let owned: Vec<i64> = sqlx::query_scalar("SELECT id FROM files WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&mut *tx)
                .await?;
            let mut doomed: BTreeSet<i64> = owned.into_iter().collect();
            expand_with_links(&mut tx, &mut doomed).await?;
            let removed = delete_files(&mut tx, &doomed).await?;

            tx.commit().await?;
            Ok(removed)
        }

        async fn get_special_container(
            &self,
            owner_id: i64,
            kind: SpecialContainer,
        ) -> MetadataResult<FileRecord> {
            let mut conn = self.pool.acquire().await?;
            fetch_special_container(&mut conn, owner_id, kind).await
        }

        async fn get_path(&self, file_id: i64) -> MetadataResult<Vec<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            let file = fetch_file(&mut conn, file_id)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("file {file_id}")))?;

            let mut ancestors = Vec::new();
            for ancestor_id in file.path_ids()? {
                let ancestor = fetch_file(&mut conn, ancestor_id).await?.ok_or_else(|| {
                    MetadataError::Inconsistent(format!(
                        "path of file {file_id} names missing ancestor {ancestor_id}"
                    ))
                })?;
                ancestors.push(ancestor);
            }
            Ok(ancestors)
        }

        async fn get_link_target(&self, file_id: i64) -> MetadataResult<Option<FileRecord>> {
            let mut conn = self.pool.acquire().await?;
            let target_id: Option<i64> =
                sqlx::query_scalar("SELECT target_id FROM file_links WHERE file_id = ?")
                    .bind(file_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let Some(target_id) = target_id else {
                return Ok(None);
            };
            fetch_file(&mut conn, target_id).await?.map(Some).ok_or_else(|| {
                MetadataError::Inconsistent(format!(
                    "link {file_id} points at missing file {target_id}"
                ))
            })
        }
    }

    #[async_trait]
    impl CapabilityRepo for SqliteStore {
        async fn grant(
            &self,
            member_id: i64,
            file_id: i64,
            capabilities: &CapabilitySet,
        ) -> MetadataResult<()> {
            let mut conn = self.pool.acquire().await?;
            upsert_grant(
                &mut conn,
                member_id,
                file_id,
                capabilities,
                OffsetDateTime::now_utc(),
            )
            .await
        }

        async fn check(
            &self,
            member_id: i64,
            file_id: i64,
            capability: Capability,
        ) -> MetadataResult<bool> {
            Ok(self
                .get_capabilities(member_id, file_id)
                .await?
                .is_some_and(|set| set.contains(capability)))
        }

        async fn get_capabilities(
            &self,
            member_id: i64,
            file_id: i64,
        ) -> MetadataResult<Option<CapabilitySet>> {
            let row = sqlx::query_as::<_, FileCapabilityRow>(
                "SELECT * FROM file_capabilities WHERE member_id = ? AND file_id = ?",
            )
            .bind(member_id)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|r| r.capability_set()).transpose()
        }

        async fn revoke(&self, member_id: i64, file_id: i64) -> MetadataResult<bool> {
            let result =
                sqlx::query("DELETE FROM file_capabilities WHERE member_id = ? AND file_id = ?")
                    .bind(member_id)
                    .bind(file_id)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn list_grants(&self, file_id: i64) -> MetadataResult<Vec<FileCapabilityRow>> {
            let rows = sqlx::query_as::<_, FileCapabilityRow>(
                "SELECT * FROM file_capabilities WHERE file_id = ? ORDER BY member_id",
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl TempFileRepo for SqliteStore {
        async fn create_temp_file(&self, temp: &TempFileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO temp_files (
                    file_key, file_name, owner_id, parent_id, byte_size,
                    state, create_date, update_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(temp.file_key)
            .bind(&temp.file_name)
            .bind(temp.owner_id)
            .bind(temp.parent_id)
            .bind(temp.byte_size)
            .bind(&temp.state)
            .bind(temp.create_date)
            .bind(temp.update_date)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_write(
                    e,
                    format!(
                        "upload of '{}' into container {} by member {}",
                        temp.file_name, temp.parent_id, temp.owner_id
                    ),
                )
            })?;
            Ok(())
        }

        async fn get_temp_file(&self, file_key: Uuid) -> MetadataResult<Option<TempFileRow>> {
            let row =
                sqlx::query_as::<_, TempFileRow>("SELECT * FROM temp_files WHERE file_key = ?")
                    .bind(file_key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn transition_temp_file(
            &self,
            file_key: Uuid,
            from: UploadState,
            to: UploadState,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<Option<TempFileRow>> {
            if !from.can_transition_to(to) || to.is_terminal() {
                return Err(MetadataError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }

            let mut tx = self.pool.begin().await?;
            let row =
                sqlx::query_as::<_, TempFileRow>("SELECT * FROM temp_files WHERE file_key = ?")
                    .bind(file_key)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(mut row) = row else {
                return Ok(None);
            };
            if row.state != from.as_str() {
                return Err(MetadataError::InvalidStateTransition {
                    from: row.state,
                    to: to.to_string(),
                });
            }

            let result = sqlx::query(
                "UPDATE temp_files SET state = ?, update_date = ? WHERE file_key = ? AND state = ?",
            )
            .bind(to.as_str())
            .bind(updated_at)
            .bind(file_key)
            .bind(from.as_str())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            tx.commit().await?;

            row.state = to.as_str().to_string();
            row.update_date = updated_at;
            Ok(Some(row))
        }

        async fn promote_temp_file(
            &self,
            file_key: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<FileRecord> {
            let mut tx = self.pool.begin().await?;
            let temp =
                sqlx::query_as::<_, TempFileRow>("SELECT * FROM temp_files WHERE file_key = ?")
                    .bind(file_key)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("temp file {file_key}")))?;

            if temp.state != UploadState::Merging.as_str() {
                return Err(MetadataError::InvalidStateTransition {
                    from: temp.state,
                    to: UploadState::Completed.to_string(),
                });
            }

            let node = NewNode {
                owner_id: temp.owner_id,
                file_name: temp.file_name.clone(),
                file_type: FileType::Block,
                parent_id: Some(temp.parent_id),
                byte_size: temp.byte_size,
                file_key: Some(temp.file_key),
                grants: vec![(temp.owner_id, CapabilitySet::full())],
                link_target: None,
            };
            // Block first, temp row second.
            let record = insert_node(&mut tx, &node, now).await?;

            sqlx::query("DELETE FROM temp_files WHERE file_key = ?")
                .bind(file_key)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(record)
        }

        async fn delete_temp_file(&self, file_key: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM temp_files WHERE file_key = ?")
                .bind(file_key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn claim_stale_temp_file(
            &self,
            file_key: Uuid,
            states: &[UploadState],
            older_than: OffsetDateTime,
        ) -> MetadataResult<bool> {
            if states.is_empty() {
                return Ok(false);
            }
            let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM temp_files WHERE file_key = ");
            qb.push_bind(file_key);
            qb.push(" AND state IN (");
            let mut sep = qb.separated(", ");
            for state in states {
                sep.push_bind(state.as_str());
            }
            sep.push_unseparated(") AND update_date < ");
            qb.push_bind(older_than);

            let result = qb.build().execute(&self.pool).await?;
            Ok(result.rows_affected() == 1)
        }

        async fn list_stale_temp_files(
            &self,
            states: &[UploadState],
            older_than: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<TempFileRow>> {
            if states.is_empty() {
                return Ok(Vec::new());
            }
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM temp_files WHERE state IN (");
            let mut sep = qb.separated(", ");
            for state in states {
                sep.push_bind(state.as_str());
            }
            sep.push_unseparated(") AND update_date < ");
            qb.push_bind(older_than);
            qb.push(" ORDER BY update_date LIMIT ");
            qb.push_bind(limit as i64);

            let rows = qb
                .build_query_as::<TempFileRow>()
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn count_temp_files(&self, owner_id: i64) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM temp_files WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl MemberRepo for SqliteStore {
        async fn create_member(
            &self,
            uuid_key: Uuid,
            created_at: OffsetDateTime,
        ) -> MetadataResult<MemberRow> {
            let id = sqlx::query("INSERT INTO members (uuid_key, created_at) VALUES (?, ?)")
                .bind(uuid_key)
                .bind(created_at)
                .execute(&self.pool)
                .await
                .map_err(|e| MetadataError::from_write(e, format!("member {uuid_key}")))?
                .last_insert_rowid();
            Ok(MemberRow {
                id,
                uuid_key,
                created_at,
            })
        }

        async fn get_member(&self, member_id: i64) -> MetadataResult<Option<MemberRow>> {
            let row = sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE id = ?")
                .bind(member_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_member_by_key(&self, uuid_key: Uuid) -> MetadataResult<Option<MemberRow>> {
            let row = sqlx::query_as::<_, MemberRow>("SELECT * FROM members WHERE uuid_key = ?")
                .bind(uuid_key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn delete_member(&self, member_id: i64) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM members WHERE id = ?")
                .bind(member_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Members
CREATE TABLE IF NOT EXISTS members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid_key BLOB NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- File forest. owner_id is not a foreign key: the forest is
-- torn down before the member row during signup compensation.
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_key BLOB NOT NULL UNIQUE,
    owner_id INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_type TEXT NOT NULL CHECK (file_type IN ('container', 'block', 'link'))
);
CREATE INDEX IF NOT EXISTS idx_files_owner_name ON files(owner_id, file_name);

CREATE TABLE IF NOT EXISTS file_infos (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    byte_size INTEGER NOT NULL DEFAULT 0,
    create_date TEXT NOT NULL,
    update_date TEXT NOT NULL
);

-- JSON array of ancestor ids, root first. Root containers store '[]'.
CREATE TABLE IF NOT EXISTS file_paths (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    path TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_paths_path ON file_paths(path);

-- Direct parent edges. One row per non-root file, checked by the store
-- rather than a unique index so violations surface as inconsistencies.
CREATE TABLE IF NOT EXISTS file_closures (
    parent_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    child_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    PRIMARY KEY (parent_id, child_id)
);
CREATE INDEX IF NOT EXISTS idx_file_closures_child ON file_closures(child_id);

CREATE TABLE IF NOT EXISTS file_links (
    file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_links_target ON file_links(target_id);

CREATE TABLE IF NOT EXISTS file_capabilities (
    member_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    capabilities TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (member_id, file_id)
);
CREATE INDEX IF NOT EXISTS idx_file_capabilities_file ON file_capabilities(file_id);

-- Provisional uploads
CREATE TABLE IF NOT EXISTS temp_files (
    file_key BLOB PRIMARY KEY,
    file_name TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    parent_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    byte_size INTEGER NOT NULL,
    state TEXT NOT NULL DEFAULT 'requested',
    create_date TEXT NOT NULL,
    update_date TEXT NOT NULL
);
-- One in-flight upload per (parent, uploader, name).
CREATE UNIQUE INDEX IF NOT EXISTS idx_temp_files_upload ON temp_files(parent_id, owner_id, file_name);
CREATE INDEX IF NOT EXISTS idx_temp_files_state ON temp_files(state, update_date);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNode;
    use loft_core::SpecialContainer;

    async fn store() -> SqliteStore {
        SqliteStore::new(":memory:", None).await.unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_store_migrates() {
        let store = store().await;
        store.health_check().await.unwrap();
        // Migration is idempotent
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_root_then_special_lookup() {
        let store = store().await;
        let root = store
            .create_node(&NewNode::container(1, None, "root"))
            .await
            .unwrap();
        let trash = store
            .create_node(&NewNode::container(1, Some(root.id), "trash"))
            .await
            .unwrap();

        let found = store
            .get_special_container(1, SpecialContainer::Trash)
            .await
            .unwrap();
        assert_eq!(found.id, trash.id);
        assert_eq!(found.path_ids().unwrap(), vec![root.id]);

        // Another member sees nothing.
        assert!(matches!(
            store.get_special_container(2, SpecialContainer::Root).await,
            Err(MetadataError::Inconsistent(_))
        ));
    }
}
