//! Network Security Perimeter Resource Association Tests

mod common;

use common::{association_config, private_endpoint_id, profile_id, Call, FakeArm, SUBSCRIPTION};
use serde_json::json;
use terraform_provider_nsp::client::{NspAssociation, NspAssociationProperties, SubResource};
use terraform_provider_nsp::error::ResourceError;
use terraform_provider_nsp::ids::ResourceAssociationId;
use terraform_provider_nsp::resources::{AssociationResource, Resource, ResourceState};
use uuid::Uuid;

fn fixed_name(base: &str) -> String {
    format!("{}-fixed", base)
}

fn association_id(name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/rg1/providers/Microsoft.Network/networkSecurityPerimeters/perim1/resourceAssociations/{}",
        SUBSCRIPTION, name
    )
}

fn state_with_id(id: &str) -> ResourceState {
    let mut state = ResourceState::new();
    state.set_id(id);
    state
}

fn last_put(fake: &FakeArm) -> (String, NspAssociation) {
    fake.calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::PutAssociation(id, body) => Some((id, body)),
            _ => None,
        })
        .last()
        .unwrap()
}

// ============== Create ==============

#[tokio::test]
async fn test_create_then_read() {
    let fake = FakeArm::new();
    let clients = fake.clients();
    let resource = AssociationResource::new();

    let created = resource
        .create(
            &clients,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Enforced"),
        )
        .await
        .unwrap();

    let id = ResourceAssociationId::parse(&created.id().unwrap()).unwrap();
    assert_eq!(id.subscription_id, SUBSCRIPTION);
    assert_eq!(id.resource_group_name, "rg1");
    assert_eq!(id.perimeter_name, "perim1");
    let suffix = id.association_name.strip_prefix("pe1-").unwrap();
    assert!(Uuid::parse_str(suffix).is_ok());

    let read = resource.read(&clients, &created).await.unwrap().unwrap();
    assert_eq!(read.get_string("access_mode").as_deref(), Some("Enforced"));
    assert_eq!(read.get_string("profile_id"), Some(profile_id("p1")));
    assert_eq!(read.get_string("resource_id"), Some(private_endpoint_id("pe1")));
}

#[tokio::test]
async fn test_create_sends_full_payload() {
    let fake = FakeArm::new();

    AssociationResource::new()
        .with_name_generator(fixed_name)
        .create(
            &fake.clients(),
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Learning"),
        )
        .await
        .unwrap();

    let (id, body) = last_put(&fake);
    assert_eq!(id, association_id("pe1-fixed"));
    assert_eq!(
        body.properties,
        Some(NspAssociationProperties {
            access_mode: Some("Learning".to_string()),
            private_link_resource: Some(SubResource::new(&private_endpoint_id("pe1"))),
            profile: Some(SubResource::new(&profile_id("p1"))),
            ..Default::default()
        })
    );
}

#[tokio::test]
async fn test_repeated_create_generates_new_names() {
    let fake = FakeArm::new();
    let clients = fake.clients();
    let resource = AssociationResource::new();
    let config = association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit");

    let first = resource.create(&clients, &config).await.unwrap();
    let second = resource.create(&clients, &config).await.unwrap();

    assert_ne!(first.id().unwrap(), second.id().unwrap());
    assert_eq!(fake.association_ids().len(), 2);
}

#[tokio::test]
async fn test_name_uses_last_segment_of_resource_id() {
    let fake = FakeArm::new();
    let resource = AssociationResource::new().with_name_generator(fixed_name);

    let created = resource
        .create(
            &fake.clients(),
            &association_config(
                &profile_id("p1"),
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/sql-1/",
                "Audit",
            ),
        )
        .await
        .unwrap();

    assert_eq!(created.id().unwrap(), association_id("sql-1-fixed"));
}

#[tokio::test]
async fn test_create_identity_follows_profile_perimeter() {
    let fake = FakeArm::new();
    let other_profile = "/subscriptions/11111111-1111-1111-1111-111111111111/resourceGroups/rg9/providers/Microsoft.Network/networkSecurityPerimeters/perim9/profiles/p9";

    let created = AssociationResource::new()
        .with_name_generator(fixed_name)
        .create(
            &fake.clients(),
            &association_config(other_profile, &private_endpoint_id("pe1"), "Audit"),
        )
        .await
        .unwrap();

    assert_eq!(
        created.id().unwrap(),
        "/subscriptions/11111111-1111-1111-1111-111111111111/resourceGroups/rg9/providers/Microsoft.Network/networkSecurityPerimeters/perim9/resourceAssociations/pe1-fixed"
    );
}

#[tokio::test]
async fn test_create_existing_requires_import() {
    let fake = FakeArm::new();
    fake.insert_association(&association_id("pe1-fixed"), NspAssociation::default());

    let err = AssociationResource::new()
        .with_name_generator(fixed_name)
        .create(
            &fake.clients(),
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::AlreadyExists { .. }));
    assert!(fake.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_create_rejects_bad_profile_id() {
    let fake = FakeArm::new();

    let err = AssociationResource::new()
        .create(
            &fake.clients(),
            &association_config("/not/a/profile", &private_endpoint_id("pe1"), "Audit"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::IdentityParse(_)));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_create_rejects_resource_id_without_name() {
    let fake = FakeArm::new();

    let err = AssociationResource::new()
        .create(
            &fake.clients(),
            &association_config(&profile_id("p1"), "///", "Audit"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Decode(_)));
}

// ============== Update ==============

#[tokio::test]
async fn test_update_merges_only_changed_fields() {
    let fake = FakeArm::new();
    let clients = fake.clients();
    let resource = AssociationResource::new().with_name_generator(fixed_name);

    let prior = resource
        .create(
            &clients,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit"),
        )
        .await
        .unwrap();

    // The service reports a profile the configuration never mentioned
    let id = association_id("pe1-fixed");
    let mut server_side = fake.association(&id).unwrap();
    server_side.properties.as_mut().unwrap().profile =
        Some(SubResource::new(&profile_id("server-side")));
    fake.insert_association(&id, server_side);

    let planned = association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Enforced");
    let updated = resource.update(&clients, &prior, &planned).await.unwrap();
    assert_eq!(updated.id().unwrap(), id);

    let (put_id, body) = last_put(&fake);
    assert_eq!(put_id, id);
    let properties = body.properties.unwrap();
    assert_eq!(properties.access_mode.as_deref(), Some("Enforced"));
    assert_eq!(properties.profile, Some(SubResource::new(&profile_id("server-side"))));
    assert_eq!(
        properties.private_link_resource,
        Some(SubResource::new(&private_endpoint_id("pe1")))
    );
    assert!(properties.provisioning_state.is_none());
}

#[tokio::test]
async fn test_update_changed_profile() {
    let fake = FakeArm::new();
    let clients = fake.clients();
    let resource = AssociationResource::new().with_name_generator(fixed_name);

    let prior = resource
        .create(
            &clients,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit"),
        )
        .await
        .unwrap();

    let planned = association_config(&profile_id("p2"), &private_endpoint_id("pe1"), "Audit");
    resource.update(&clients, &prior, &planned).await.unwrap();

    let (put_id, body) = last_put(&fake);
    // The name is never recomputed
    assert_eq!(put_id, association_id("pe1-fixed"));
    let properties = body.properties.unwrap();
    assert_eq!(properties.profile, Some(SubResource::new(&profile_id("p2"))));
    assert_eq!(properties.access_mode.as_deref(), Some("Audit"));
}

#[tokio::test]
async fn test_update_missing_remote_object_fails() {
    let fake = FakeArm::new();
    let mut prior = association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit");
    prior.set_id(association_id("gone"));

    let err = AssociationResource::new()
        .update(
            &fake.clients(),
            &prior,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Enforced"),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ResourceError::Upstream {
            operation: "retrieving",
            ..
        }
    ));
    assert!(fake.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_update_without_model_is_invalid_state() {
    let fake = FakeArm::new();
    let id = association_id("pe1-fixed");
    fake.insert_association(&id, NspAssociation::default());
    fake.return_empty_models(true);

    let mut prior = association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit");
    prior.set_id(&id);

    let err = AssociationResource::new()
        .update(
            &fake.clients(),
            &prior,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Enforced"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::InvalidState(ref m) if m.contains("`model` was nil")));
    assert!(fake.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_update_without_properties_is_invalid_state() {
    let fake = FakeArm::new();
    let id = association_id("pe1-fixed");
    fake.insert_association(&id, NspAssociation::default());

    let mut prior = association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Audit");
    prior.set_id(&id);

    let err = AssociationResource::new()
        .update(
            &fake.clients(),
            &prior,
            &association_config(&profile_id("p1"), &private_endpoint_id("pe1"), "Enforced"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::InvalidState(ref m) if m.contains("`properties` was nil")));
}

// ============== Read ==============

#[tokio::test]
async fn test_read_not_found_is_gone() {
    let fake = FakeArm::new();

    let read = AssociationResource::new()
        .read(&fake.clients(), &state_with_id(&association_id("missing")))
        .await
        .unwrap();

    assert!(read.is_none());
}

#[tokio::test]
async fn test_read_import_state() {
    let fake = FakeArm::new();
    let id = association_id("pe1-1234");
    fake.insert_association(
        &id,
        NspAssociation {
            properties: Some(NspAssociationProperties {
                access_mode: Some("Learning".to_string()),
                private_link_resource: Some(SubResource::new(&private_endpoint_id("pe1"))),
                profile: Some(SubResource::new(&profile_id("p1"))),
                provisioning_state: Some("Succeeded".to_string()),
                has_provisioning_issues: None,
            }),
            ..Default::default()
        },
    );

    let read = AssociationResource::new()
        .read(&fake.clients(), &state_with_id(&id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(read.get("access_mode"), Some(&json!("Learning")));
    assert_eq!(read.get("id"), Some(&json!(id)));
    assert_eq!(read.values.len(), 4);
}

#[tokio::test]
async fn test_read_without_properties_keeps_identity() {
    let fake = FakeArm::new();
    let id = association_id("pe1-1234");
    fake.insert_association(&id, NspAssociation::default());

    let read = AssociationResource::new()
        .read(&fake.clients(), &state_with_id(&id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(read.get_string("id"), Some(id));
    assert_eq!(read.get_string("access_mode").as_deref(), Some(""));
    assert_eq!(read.get_string("profile_id").as_deref(), Some(""));
}

// ============== Delete ==============

#[tokio::test]
async fn test_delete() {
    let fake = FakeArm::new();
    let id = association_id("pe1-1234");
    fake.insert_association(&id, NspAssociation::default());

    AssociationResource::new()
        .delete(&fake.clients(), &state_with_id(&id))
        .await
        .unwrap();

    assert!(fake.association(&id).is_none());
    assert_eq!(fake.calls(), vec![Call::DeleteAssociation(id)]);
}

#[tokio::test]
async fn test_delete_failure_is_fatal() {
    let fake = FakeArm::new();
    fake.fail_with(500, "boom");

    let err = AssociationResource::new()
        .delete(&fake.clients(), &state_with_id(&association_id("pe1-1234")))
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("deleting "));
    assert_eq!(fake.calls().len(), 1);
}
