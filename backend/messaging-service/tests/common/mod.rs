use chrono::{TimeZone, Utc};
use messaging_service::{
    clock::ManualClock,
    ids::SequentialIdGenerator,
    models::{Role, User},
    repository::InMemoryUserDirectory,
    services::{Collaborators, MessagingService},
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Fixture {
    pub admin: User,
    pub second_admin: User,
    pub client: User,
    pub other_client: User,
    pub clock: Arc<ManualClock>,
    pub collaborators: Collaborators,
}

#[allow(dead_code)]
impl Fixture {
    pub fn service(&self) -> MessagingService {
        MessagingService::new(self.collaborators.clone(), STORE_TIMEOUT)
    }

    pub fn users(&self) -> Vec<User> {
        vec![
            self.admin.clone(),
            self.second_admin.clone(),
            self.client.clone(),
            self.other_client.clone(),
        ]
    }
}

pub fn user(name: &str, role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role,
        is_online: false,
    }
}

/// Two admins and two clients over in-memory storage, a manual clock and
/// sequential ids.
pub fn fixture() -> Fixture {
    let admin = user("Alex", Role::Admin);
    let second_admin = user("Sam", Role::Admin);
    let client = user("Jordan", Role::Client);
    let other_client = user("Casey", Role::Client);

    let directory = Arc::new(InMemoryUserDirectory::with_users([
        admin.clone(),
        second_admin.clone(),
        client.clone(),
        other_client.clone(),
    ]));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    ));
    let collaborators = Collaborators::in_memory(directory)
        .with_clock(clock.clone())
        .with_ids(Arc::new(SequentialIdGenerator::starting_at(1_000)));

    Fixture {
        admin,
        second_admin,
        client,
        other_client,
        clock,
        collaborators,
    }
}
