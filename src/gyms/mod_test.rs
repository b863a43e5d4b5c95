use super::*;

fn gym() -> Gym {
    Gym {
        id: Uuid::new_v4(),
        name: "My Gym".into(),
        email: "a@b.com".into(),
        phone: None,
        company_name: None,
        address: Some("1 Main St".into()),
        owner_id: None,
    }
}

#[test]
fn normalize_email_trims_and_lowercases() {
    assert_eq!(normalize_email("  A@B.Com "), "a@b.com");
}

#[test]
fn owner_from_user_normalizes() {
    let user = User { id: Uuid::new_v4(), email: "X@Y.com".into() };
    let owner = GymOwner::from_user(&user);
    assert_eq!(owner.email, "x@y.com");
    assert_eq!(owner.user_id, Some(user.id));
}

#[test]
fn update_applies_only_set_fields() {
    let mut g = gym();
    let update = GymUpdate { name: Some("Apex".into()), phone: Some("555".into()), ..GymUpdate::default() };
    update.apply(&mut g);
    assert_eq!(g.name, "Apex");
    assert_eq!(g.phone.as_deref(), Some("555"));
    assert_eq!(g.address.as_deref(), Some("1 Main St"));
    assert!(g.owner_id.is_none());
}

#[test]
fn empty_update() {
    assert!(GymUpdate::default().is_empty());
    assert!(!GymUpdate { address: Some(String::new()), ..GymUpdate::default() }.is_empty());
}

#[test]
fn update_serializes_set_fields_only() {
    let update = GymUpdate { name: Some("Apex".into()), ..GymUpdate::default() };
    assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({ "name": "Apex" }));
}

#[test]
fn gym_deserializes_with_missing_optionals() {
    let id = Uuid::new_v4();
    let g: Gym = serde_json::from_value(serde_json::json!({ "id": id, "name": "Apex", "email": "a@b.com" })).unwrap();
    assert_eq!(g.id, id);
    assert!(g.phone.is_none());
    assert!(g.owner_id.is_none());
}

#[test]
fn error_codes() {
    assert_eq!(GymStoreError::Conflict.error_code(), "E_GYM_CONFLICT");
    assert_eq!(GymStoreError::NotFound(Uuid::nil()).error_code(), "E_GYM_NOT_FOUND");
    assert!(GymStoreError::Backend(BackendError::Network("down".into())).retryable());
    assert!(!GymStoreError::Conflict.retryable());
}
