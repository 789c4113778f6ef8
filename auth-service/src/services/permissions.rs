use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{AuthError, CredentialStore};

/// Deduplicated permissions as parallel id/code arrays, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    pub ids: Vec<i32>,
    pub codes: Vec<String>,
}

/// Tenant-scoped roles as parallel id/name arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    pub ids: Vec<Uuid>,
    pub names: Vec<String>,
}

/// Computes the permissions a user holds in one tenant. Nothing is cached:
/// every token issuance sees the current role and grant edges.
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn CredentialStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, user_id: Uuid, tenant_id: Uuid) -> Result<PermissionSet, AuthError> {
        let grants = self.store.find_permission_grants(user_id, tenant_id).await?;

        let mut by_id: BTreeMap<i32, String> = BTreeMap::new();
        for grant in grants {
            if grant.role_tenant_id != tenant_id {
                tracing::error!(
                    user_id = %user_id,
                    tenant_id = %tenant_id,
                    role_id = %grant.role_id,
                    role_tenant_id = %grant.role_tenant_id,
                    "Dropping permission granted through a role of another tenant"
                );
                continue;
            }
            by_id.entry(grant.permission_id).or_insert(grant.permission_code);
        }

        let (ids, codes) = by_id.into_iter().unzip();
        Ok(PermissionSet { ids, codes })
    }

    pub async fn resolve_roles(&self, user_id: Uuid, tenant_id: Uuid) -> Result<RoleSet, AuthError> {
        let roles = self.store.find_roles_for_user(user_id, tenant_id).await?;

        let (ids, names) = roles
            .into_iter()
            .filter(|role| role.tenant_id == tenant_id)
            .map(|role| (role.role_id, role.role_name))
            .unzip();
        Ok(RoleSet { ids, names })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Permission, Role, User};
    use crate::services::MemoryCredentialStore;

    struct Fixture {
        store: Arc<MemoryCredentialStore>,
        resolver: PermissionResolver,
        tenant_id: Uuid,
        user_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryCredentialStore::new());
        store.insert_permission(Permission::new(1, "USER_VIEW")).unwrap();
        store.insert_permission(Permission::new(2, "USER_MANAGE")).unwrap();
        store.insert_permission(Permission::new(3, "ROLE_VIEW")).unwrap();

        let tenant_id = Uuid::new_v4();
        let user = User::new(tenant_id, "a@x.com".into(), Some("hash".into()));
        let user_id = user.user_id;
        store.insert_user(user).unwrap();

        Fixture {
            resolver: PermissionResolver::new(store.clone()),
            store,
            tenant_id,
            user_id,
        }
    }

    #[tokio::test]
    async fn permissions_are_deduplicated_and_ordered() {
        let f = fixture();
        let viewer = Role::new(f.tenant_id, "viewer".into(), false);
        let manager = Role::new(f.tenant_id, "manager".into(), false);
        f.store.insert_role(viewer.clone()).unwrap();
        f.store.insert_role(manager.clone()).unwrap();
        f.store.grant_permission(viewer.role_id, 3).unwrap();
        f.store.grant_permission(viewer.role_id, 1).unwrap();
        f.store.grant_permission(manager.role_id, 1).unwrap();
        f.store.grant_permission(manager.role_id, 2).unwrap();
        f.store.assign_role(f.user_id, viewer.role_id, None).unwrap();
        f.store.assign_role(f.user_id, manager.role_id, None).unwrap();

        let set = f.resolver.resolve(f.user_id, f.tenant_id).await.unwrap();
        assert_eq!(set.ids, vec![1, 2, 3]);
        assert_eq!(set.codes, vec!["USER_VIEW", "USER_MANAGE", "ROLE_VIEW"]);

        let roles = f.resolver.resolve_roles(f.user_id, f.tenant_id).await.unwrap();
        assert_eq!(roles.names, vec!["manager", "viewer"]);
    }

    #[tokio::test]
    async fn roles_of_other_tenants_contribute_nothing() {
        let f = fixture();
        let foreign = Role::new(Uuid::new_v4(), "foreign-admin".into(), false);
        f.store.insert_role(foreign.clone()).unwrap();
        f.store.grant_permission(foreign.role_id, 2).unwrap();
        // Mis-scoped edge: the user is linked to another tenant's role.
        f.store.assign_role(f.user_id, foreign.role_id, None).unwrap();

        let set = f.resolver.resolve(f.user_id, f.tenant_id).await.unwrap();
        assert!(set.ids.is_empty());
        let roles = f.resolver.resolve_roles(f.user_id, f.tenant_id).await.unwrap();
        assert!(roles.ids.is_empty());
    }

    #[tokio::test]
    async fn grant_and_revoke_round_trip() {
        let f = fixture();
        let role = Role::new(f.tenant_id, "viewer".into(), false);
        f.store.insert_role(role.clone()).unwrap();
        f.store.assign_role(f.user_id, role.role_id, None).unwrap();

        f.store.grant_permission(role.role_id, 1).unwrap();
        let granted = f.resolver.resolve(f.user_id, f.tenant_id).await.unwrap();
        assert!(granted.ids.contains(&1));
        assert!(granted.codes.iter().any(|c| c == "USER_VIEW"));

        f.store.revoke_permission(role.role_id, 1).unwrap();
        let revoked = f.resolver.resolve(f.user_id, f.tenant_id).await.unwrap();
        assert!(!revoked.ids.contains(&1));
        assert!(!revoked.codes.iter().any(|c| c == "USER_VIEW"));
    }
}
