//! Process-local repositories.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Result, ServiceError};
use crate::rbac::{Role, RouteRoleRepository};
use crate::users::{NewUser, User, UserRepository};

/// Users kept in a map; ids are assigned from a monotonic counter.
#[derive(Debug)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<i64, User>>,
    next_id: AtomicI64,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

fn email_taken(
    users: &HashMap<i64, User>,
    email: &str,
    except: Option<i64>,
) -> bool {
    users.values().any(|user| {
        Some(user.id) != except && user.email.eq_ignore_ascii_case(email)
    })
}

fn duplicate_email(email: &str) -> ServiceError {
    ServiceError::already_exists(format!("email {email} is already registered"))
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new: NewUser) -> Result<User> {
        let mut users = self.users.write();
        if email_taken(&users, &new.email, None) {
            return Err(duplicate_email(&new.email));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let user = User {
            id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<bool> {
        let mut users = self.users.write();
        if !users.contains_key(&user.id) {
            return Ok(false);
        }
        if email_taken(&users, &user.email, Some(user.id)) {
            return Err(duplicate_email(&user.email));
        }
        users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.users.write().remove(&id).is_some())
    }
}

/// Route bindings held in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryRouteRoleRepository {
    bindings: DashMap<String, HashSet<Role>>,
}

impl InMemoryRouteRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings<I, R>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, R)>,
        R: IntoIterator<Item = Role>,
    {
        let repo = Self::new();
        for (route, roles) in bindings {
            repo.bind(route, roles);
        }
        repo
    }

    /// Replace the role set bound to `route`.
    pub fn bind(
        &self,
        route: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) {
        self.bindings
            .insert(route.into(), roles.into_iter().collect());
    }
}

#[async_trait]
impl RouteRoleRepository for InMemoryRouteRoleRepository {
    async fn get_route_roles(
        &self,
        route: &str,
    ) -> anyhow::Result<HashSet<Role>> {
        Ok(self
            .bindings
            .get(route)
            .map(|roles| roles.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Utc;

    fn new_user(email: &str) -> NewUser {
        let now = Utc::now();
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let repo = InMemoryUserRepository::new();
        let first = repo.create(new_user("a@b.com")).await.unwrap();
        let second = repo.create(new_user("c@d.com")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn rejects_duplicate_emails_case_insensitively() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("a@b.com")).await.unwrap();

        let err = repo.create(new_user("A@B.com")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn update_guards_email_uniqueness() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("a@b.com")).await.unwrap();
        let mut other = repo.create(new_user("c@d.com")).await.unwrap();

        other.email = "a@b.com".into();
        let err = repo.update(&other).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        other.email = "c@d.com".into();
        other.name = "Carol".into();
        assert!(repo.update(&other).await.unwrap());
        assert_eq!(repo.get(other.id).await.unwrap().unwrap().name, "Carol");
    }

    #[tokio::test]
    async fn missing_rows_report_false() {
        let repo = InMemoryUserRepository::new();
        let mut ghost = repo.create(new_user("a@b.com")).await.unwrap();
        assert!(repo.delete(ghost.id).await.unwrap());

        ghost.name = "Ghost".into();
        assert!(!repo.update(&ghost).await.unwrap());
        assert!(!repo.delete(ghost.id).await.unwrap());
        assert!(repo.get_by_email("a@b.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn route_bindings_default_to_empty() {
        let repo = InMemoryRouteRoleRepository::with_bindings([(
            "/admin.Endpoint".to_string(),
            vec![Role::Admin],
        )]);

        let roles = repo.get_route_roles("/admin.Endpoint").await.unwrap();
        assert!(roles.contains(&Role::Admin));
        assert!(!roles.contains(&Role::User));
        assert!(repo.get_route_roles("/other").await.unwrap().is_empty());
    }
}
