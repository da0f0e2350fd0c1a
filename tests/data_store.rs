mod common;

#[cfg(test)]
mod tests {
    use crate::common::{day, fast_connection, healthy_endpoint, remote_at, Fault, ScriptedRemote};
    use rollcall::db::db::Db;
    use rollcall::db::local_store::LocalStore;
    use rollcall::libs::connection::{ConnectionManager, Mode};
    use rollcall::libs::error::StoreError;
    use rollcall::libs::store::{DataStore, EntityStore};
    use std::sync::Arc;
    use test_context::{test_context, AsyncTestContext};

    struct DataStoreTestContext {
        store: Arc<DataStore<ScriptedRemote>>,
    }

    impl AsyncTestContext for DataStoreTestContext {
        async fn setup() -> Self {
            let endpoint = healthy_endpoint().await;
            let connection = Arc::new(ConnectionManager::new(&fast_connection(endpoint), Some(&remote_at(endpoint))));
            let local = LocalStore::new(Db::open_in_memory().unwrap());
            let store = Arc::new(DataStore::new(connection, Some(ScriptedRemote::new()), local));
            DataStoreTestContext { store }
        }
    }

    impl DataStoreTestContext {
        fn remote(&self) -> &ScriptedRemote {
            self.store.remote().unwrap()
        }
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_mark_attendance_is_idempotent(ctx: &mut DataStoreTestContext) {
        let class = ctx.store.create_class(uuid::Uuid::new_v4(), "Hillside", "7B", "2024-25").await.unwrap();
        let student = ctx.store.create_student(class.id, "Grace").await.unwrap();

        let first = ctx.store.mark_attendance(student.id, day("2024-01-01"), true).await.unwrap();
        let second = ctx.store.mark_attendance(student.id, day("2024-01-01"), false).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(!second.status);
        assert_eq!(ctx.remote().attendance().len(), 1);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_concurrent_marks_keep_one_record(ctx: &mut DataStoreTestContext) {
        let student_id = uuid::Uuid::new_v4();
        let date = day("2024-01-02");

        let marks = (0..8).map(|i| {
            let store = ctx.store.clone();
            tokio::spawn(async move { store.mark_attendance(student_id, date, i % 2 == 0).await })
        });
        for handle in marks.collect::<Vec<_>>() {
            handle.await.unwrap().unwrap();
        }

        let records = ctx.remote().attendance();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, student_id);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_lost_insert_race_becomes_update(ctx: &mut DataStoreTestContext) {
        let student_id = uuid::Uuid::new_v4();
        ctx.remote().race_next_insert();

        let record = ctx.store.mark_attendance(student_id, day("2024-01-03"), true).await.unwrap();

        assert!(record.status);
        let records = ctx.remote().attendance();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, record.id);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_connectivity_failure_falls_back_and_demotes(ctx: &mut DataStoreTestContext) {
        ctx.remote().fail(Fault::Offline);
        let remote_calls = ctx.remote().calls();
        let class_id = uuid::Uuid::new_v4();

        let student = ctx.store.create_student(class_id, "Grace").await.unwrap();

        assert_eq!(ctx.store.connection().mode(), Mode::LocalFallback);
        let local_roster = ctx.store.local().students_by_class(class_id).await.unwrap();
        assert_eq!(local_roster, vec![student]);
        assert_eq!(ctx.remote().calls(), remote_calls + 1);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_fallback_mode_is_sticky(ctx: &mut DataStoreTestContext) {
        ctx.remote().fail(Fault::Timeout);
        ctx.store.create_student(uuid::Uuid::new_v4(), "Grace").await.unwrap();
        assert_eq!(ctx.store.connection().mode(), Mode::LocalFallback);

        let remote = ctx.remote();
        remote.heal();
        let calls = remote.calls();

        let class_id = uuid::Uuid::new_v4();
        ctx.store.create_student(class_id, "Ada").await.unwrap();
        ctx.store.students_by_class(class_id).await.unwrap();

        assert_eq!(remote.calls(), calls);
        assert_eq!(ctx.store.connection().mode(), Mode::LocalFallback);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_retry_returns_to_remote(ctx: &mut DataStoreTestContext) {
        ctx.remote().fail(Fault::Unavailable);
        ctx.store.teacher_by_email("ada@example.com").await.unwrap();
        assert_eq!(ctx.store.connection().mode(), Mode::LocalFallback);

        ctx.remote().heal();
        ctx.store.connection().retry().await;

        assert_eq!(ctx.store.connection().mode(), Mode::Remote);
        let teacher = ctx.store.create_teacher("ada@example.com", "Ada").await.unwrap();
        assert_eq!(ctx.remote().teachers(), vec![teacher]);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_rejection_is_not_absorbed(ctx: &mut DataStoreTestContext) {
        ctx.remote().fail_on("create_class", Fault::Rejected);

        let err = ctx
            .store
            .create_class(uuid::Uuid::new_v4(), "Hillside", "7B", "2024-25")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Service { status: 400, .. }));
        assert_eq!(ctx.store.connection().mode(), Mode::Remote);
        assert!(ctx.store.local().db().read_collection::<serde_json::Value>("classes").unwrap().is_empty());
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_input_is_validated_before_routing(ctx: &mut DataStoreTestContext) {
        let calls = ctx.remote().calls();

        assert!(matches!(
            ctx.store.create_teacher("not-an-email", "Ada").await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            ctx.store.create_student(uuid::Uuid::new_v4(), "   ").await,
            Err(StoreError::Validation(_))
        ));
        assert_eq!(ctx.remote().calls(), calls);
    }

    #[test_context(DataStoreTestContext)]
    #[tokio::test]
    async fn test_teacher_email_is_normalized(ctx: &mut DataStoreTestContext) {
        let teacher = ctx.store.create_teacher(" Ada@Example.COM ", "Ada").await.unwrap();
        assert_eq!(teacher.email, "ada@example.com");
        assert_eq!(ctx.store.teacher_by_email("ADA@example.com").await.unwrap(), Some(teacher));
    }
}
