use contact_sync_core::db::open_db_in_memory;
use contact_sync_core::repo::account_repo::{
    DEFAULT_NOTIFICATION_CHANNEL, NEW_ACCOUNT_NOTIFICATION,
};
use contact_sync_core::{
    AccountPlatform, Contact, ContactDirectory, CreateAccountOptions, RepoError,
    SqliteAccountPlatform, SqliteContactDirectory,
};

#[test]
fn contacts_by_email_are_case_insensitive_and_ordered_by_id() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(9, "dup@x.com", "Late", "Dup"))
        .unwrap();
    contacts
        .upsert_contact(&Contact::new(3, "DUP@x.com", "Early", "Dup"))
        .unwrap();

    let found = contacts.get_contacts_by_email(" Dup@X.com ").unwrap();
    let ids = found.iter().map(|contact| contact.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![3, 9]);
    assert!(contacts.get_contacts_by_email("").unwrap().is_empty());
}

#[test]
fn upsert_contact_replaces_fields() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(1, "old@x.com", "Old", "Name"))
        .unwrap();
    contacts
        .upsert_contact(&Contact::new(1, "new@x.com", "New", "Name"))
        .unwrap();

    let loaded = contacts.get_contact_by_id(1).unwrap().unwrap();
    assert_eq!(loaded.email, "new@x.com");
    assert_eq!(loaded.first_name, "New");
}

#[test]
fn create_account_copies_contact_and_queues_notification() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(42, "a@x.com", "A", "X"))
        .unwrap();

    let created = platform
        .create_account(42, &CreateAccountOptions::for_reconcile())
        .unwrap();
    assert!(created.newly_created);
    assert_eq!(created.account.email, "a@x.com");
    assert_eq!(created.account.linked_contact_id, Some(42));
    assert_eq!(created.account.first_name, "A");
    assert!(!created.account.password_reset_required);

    let notifications = platform.notifications_for(created.account.id).unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].channel, DEFAULT_NOTIFICATION_CHANNEL);
    assert_eq!(notifications[0].kind, NEW_ACCOUNT_NOTIFICATION);
    assert!(platform.roles_for(created.account.id).unwrap().is_empty());
}

#[test]
fn create_account_honours_non_default_options() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(5, "b@x.com", "B", "Y"))
        .unwrap();

    let options = CreateAccountOptions {
        force_password_reset: true,
        notify_user: false,
        extra_roles: vec!["member".to_string(), " ".to_string(), "editor".to_string()],
        idempotent: true,
    };
    let created = platform.create_account(5, &options).unwrap();
    assert!(created.account.password_reset_required);
    assert!(platform
        .notifications_for(created.account.id)
        .unwrap()
        .is_empty());
    assert_eq!(
        platform.roles_for(created.account.id).unwrap(),
        vec!["editor".to_string(), "member".to_string()]
    );
}

#[test]
fn idempotent_create_returns_existing_account() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(42, "a@x.com", "A", "X"))
        .unwrap();

    let options = CreateAccountOptions::for_reconcile();
    let first = platform.create_account(42, &options).unwrap();
    let second = platform.create_account(42, &options).unwrap();
    assert!(!second.newly_created);
    assert_eq!(second.account.id, first.account.id);
    assert_eq!(platform.count_accounts().unwrap(), 1);
    assert_eq!(platform.notifications_for(first.account.id).unwrap().len(), 1);
}

#[test]
fn non_idempotent_create_reports_conflict() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(42, "a@x.com", "A", "X"))
        .unwrap();
    platform.register_account("A@x.com", "", "").unwrap();

    let options = CreateAccountOptions {
        idempotent: false,
        ..CreateAccountOptions::for_reconcile()
    };
    let err = platform.create_account(42, &options).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[test]
fn create_account_requires_existing_contact_with_email() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(7, "", "No", "Email"))
        .unwrap();
    let options = CreateAccountOptions::for_reconcile();

    assert!(matches!(
        platform.create_account(404, &options).unwrap_err(),
        RepoError::NotFound("contact", 404)
    ));
    assert!(matches!(
        platform.create_account(7, &options).unwrap_err(),
        RepoError::InvalidData(_)
    ));
    assert_eq!(platform.count_accounts().unwrap(), 0);
}

#[test]
fn link_conflicts_and_missing_accounts_are_reported() {
    let conn = open_db_in_memory().unwrap();
    let contacts = SqliteContactDirectory::try_new(&conn).unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    contacts
        .upsert_contact(&Contact::new(1, "one@x.com", "One", "X"))
        .unwrap();
    let linked = platform
        .create_account(1, &CreateAccountOptions::for_reconcile())
        .unwrap()
        .account;
    let loose = platform.register_account("loose@x.com", "", "").unwrap();

    assert!(matches!(
        platform.set_account_contact_link(loose.id, 1).unwrap_err(),
        RepoError::Conflict(_)
    ));
    assert!(matches!(
        platform.set_account_contact_link(9_999, 1).unwrap_err(),
        RepoError::NotFound("account", 9_999)
    ));

    platform.set_account_contact_link(loose.id, 2).unwrap();
    let reloaded = platform.get_account_by_id(loose.id).unwrap().unwrap();
    assert_eq!(reloaded.linked_contact_id, Some(2));
    assert_eq!(
        platform.get_account_by_linked_contact(1).unwrap().unwrap().id,
        linked.id
    );
    assert_eq!(
        platform.get_account_by_linked_contact(2).unwrap().unwrap().id,
        loose.id
    );
    assert!(platform.get_account_by_linked_contact(3).unwrap().is_none());
    assert_eq!(
        platform
            .get_account_by_email("ONE@x.com")
            .unwrap()
            .unwrap()
            .id,
        linked.id
    );
}

#[test]
fn register_account_rejects_duplicate_email() {
    let conn = open_db_in_memory().unwrap();
    let platform = SqliteAccountPlatform::try_new(&conn).unwrap();
    platform.register_account("a@x.com", "A", "X").unwrap();

    let err = platform.register_account(" A@X.com ", "A", "X").unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[test]
fn adapters_reject_unmigrated_connection() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    assert!(matches!(
        SqliteContactDirectory::try_new(&conn),
        Err(RepoError::InvalidData(_))
    ));
    assert!(matches!(
        SqliteAccountPlatform::try_new(&conn),
        Err(RepoError::InvalidData(_))
    ));
}
