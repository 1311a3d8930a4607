//! Postgres store integration tests.
//!
//! These need a reachable database; provide DATABASE_URL (a `.env` file
//! works) and run with `cargo test -- --ignored`.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::env;

use bus_tracker::models::{NewVehicle, Position, VehicleId, VehicleStatus};
use bus_tracker::store::{LocationStore, PgLocationStore};

async fn setup_test_db() -> Pool<Postgres> {
    dotenvy::dotenv().ok();
    let database_url =
        env::var("DATABASE_URL").expect("Environment variable DATABASE_URL required");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn new_vehicle(reg_no: &str, bus_number: &str) -> NewVehicle {
    NewVehicle {
        reg_no: reg_no.to_string(),
        bus_number: bus_number.to_string(),
        organization: Some("test-org".to_string()),
        route: Default::default(),
    }
}

#[ignore = "requires a running Postgres"]
#[tokio::test]
async fn register_update_and_demote() {
    let pool = setup_test_db().await;
    let store = PgLocationStore::new(pool.clone());

    let reg_no = format!("T{}", Utc::now().timestamp_micros());
    let id = VehicleId::try_from(reg_no.as_str()).unwrap();
    store
        .register(new_vehicle(&reg_no, ""))
        .await
        .expect("Failed to register vehicle");

    let seen = Utc::now();
    let position = Position::new(11.05, 78.1, 20.0, seen).unwrap();
    let record = store
        .apply_location(&id, position, seen)
        .await
        .expect("Failed to apply location");
    assert_eq!(record.status, VehicleStatus::Online);
    assert_eq!(record.position.unwrap().latitude, 11.05);

    // CAS with a stale observation loses; with the current one it wins.
    let stale = seen - chrono::Duration::seconds(30);
    assert!(!store.mark_offline_if_unseen_since(&id, stale).await.unwrap());
    assert!(store.mark_offline_if_unseen_since(&id, seen).await.unwrap());

    let record = store.find(&id).await.unwrap().unwrap();
    assert_eq!(record.status, VehicleStatus::Offline);

    store.remove(&id).await.unwrap();
}

#[ignore = "requires a running Postgres"]
#[tokio::test]
async fn unknown_vehicle_rejected() {
    let pool = setup_test_db().await;
    let store = PgLocationStore::new(pool);

    let id = VehicleId::try_from("NO-SUCH-BUS").unwrap();
    let seen = Utc::now();
    let position = Position::new(11.05, 78.1, 20.0, seen).unwrap();
    assert!(store.apply_location(&id, position, seen).await.is_err());
}

#[ignore = "requires a running Postgres"]
#[tokio::test]
async fn lookup_by_bus_number() {
    let pool = setup_test_db().await;
    let store = PgLocationStore::new(pool);

    let reg_no = format!("T{}", Utc::now().timestamp_micros());
    let bus_number = format!("N{}", Utc::now().timestamp_millis() % 100_000);
    store
        .register(new_vehicle(&reg_no, &bus_number))
        .await
        .unwrap();

    let found = store
        .find(&VehicleId::try_from(bus_number.as_str()).unwrap())
        .await
        .unwrap();
    assert!(found.is_some());
    assert_eq!(found.unwrap().vehicle_id.as_str(), reg_no.to_uppercase());

    store
        .remove(&VehicleId::try_from(reg_no.as_str()).unwrap())
        .await
        .unwrap();
}
