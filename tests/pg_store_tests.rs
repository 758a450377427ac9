//! PostgreSQL store tests. Run with a scratch database:
//! `TEST_DATABASE_URL=postgresql://localhost/unigoods_test cargo test -- --ignored`

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use uuid::Uuid;

    use unigoods_server::db::run_migrations;
    use unigoods_server::item::{ItemCondition, ItemRegistry, NewItem, PgItemRegistry};
    use unigoods_server::models::{OwnerSnapshot, PartySnapshot};
    use unigoods_server::trade::{NewTrade, PgTradeStore, TradeStatus, TradeStore};
    use unigoods_server::verification::{
        Applicant, PgVerificationStore, ReviewOutcome, SubmitOutcome, VerificationStatus,
        VerificationStore,
    };

    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/unigoods_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn new_item(owner: Uuid, title: &str) -> NewItem {
        NewItem {
            title: title.to_string(),
            description: format!("{} for a semester", title),
            condition: ItemCondition::Good,
            category: Some("dorm".to_string()),
            tags: vec!["campus".to_string()],
            image_url: "https://img.example/item.png".to_string(),
            owner: OwnerSnapshot {
                id: owner,
                name: "Owner".to_string(),
                university: "State U".to_string(),
            },
        }
    }

    fn party(id: Uuid, name: &str) -> PartySnapshot {
        PartySnapshot {
            id,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_reserve_rolls_back_partial_match() {
        let registry = PgItemRegistry::new(setup_test_db().await);
        let owner = Uuid::new_v4();
        let free = registry.create(new_item(owner, "Fan")).await.unwrap();
        let held = registry.create(new_item(owner, "Heater")).await.unwrap();
        registry.set_availability(&[held.id], false).await.unwrap();

        assert!(!registry.reserve(&[free.id, held.id], owner).await.unwrap());
        assert!(registry.get(free.id).await.unwrap().unwrap().is_available);

        assert!(registry.reserve(&[free.id], owner).await.unwrap());
        assert!(!registry.get(free.id).await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_trade_status_compare_and_set() {
        let store = PgTradeStore::new(setup_test_db().await);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let trade = store
            .create(NewTrade {
                initiator: party(alice, "Alice"),
                recipient: party(bob, "Bob"),
                offered_items: vec![Uuid::new_v4()],
                requested_items: vec![Uuid::new_v4()],
                message: Some("interested?".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(trade.status, TradeStatus::Pending);
        assert_eq!(trade.messages.len(), 1);

        let accepted = store
            .set_status(trade.id, TradeStatus::Pending, TradeStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(accepted.map(|t| t.status), Some(TradeStatus::Accepted));

        let stale = store
            .set_status(trade.id, TradeStatus::Pending, TradeStatus::Rejected)
            .await
            .unwrap();
        assert!(stale.is_none());

        assert!(!store.delete(trade.id, TradeStatus::Pending).await.unwrap());

        let with_reply = store
            .append_message(trade.id, bob, "deal".to_string())
            .await
            .unwrap();
        assert_eq!(with_reply.messages.len(), 2);
        assert_eq!(with_reply.messages[1].sender_id, bob);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_single_open_verification_per_user() {
        let store = PgVerificationStore::new(setup_test_db().await);
        let applicant = Applicant {
            user_id: Uuid::new_v4(),
            name: "Dana".to_string(),
            university: "State U".to_string(),
        };

        let first = match store
            .submit(applicant.clone(), "https://img.example/a.png".to_string())
            .await
            .unwrap()
        {
            SubmitOutcome::Created(v) => v,
            SubmitOutcome::Existing(status) => panic!("unexpected existing {:?}", status),
        };

        let second = store
            .submit(applicant.clone(), "https://img.example/b.png".to_string())
            .await
            .unwrap();
        assert!(matches!(
            second,
            SubmitOutcome::Existing(VerificationStatus::Pending)
        ));

        let reviewed = store
            .review(
                first.id,
                ReviewOutcome {
                    status: VerificationStatus::Rejected,
                    reviewer_id: Uuid::new_v4(),
                    rejection_reason: Some("blurry".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reviewed.status, VerificationStatus::Rejected);

        let retry = store
            .submit(applicant, "https://img.example/c.png".to_string())
            .await
            .unwrap();
        assert!(matches!(retry, SubmitOutcome::Created(_)));
    }
}
