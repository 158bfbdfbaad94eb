//! Principal directory: registration, login and token authentication

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{NewUser, Principal, RegisterUser, Role, User, UserClaims},
    repository::Repository,
};

const DEFAULT_POSITION: &str = "Employee";

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new user. The role is always `user`.
    pub async fn register(&self, data: RegisterUser) -> AppResult<User> {
        data.validate()?;

        let email = data.email.trim().to_lowercase();
        let username = data.username.trim().to_string();

        if self.repository.users.exists(&email, &username).await? {
            return Err(AppError::Conflict("Email or username already exists".to_string()));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                first_name: data.first_name.trim().to_string(),
                last_name: data.last_name.trim().to_string(),
                email,
                username,
                password_hash: hash_password(&data.password)?,
                contact: data.contact,
                position: data
                    .position
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_POSITION.to_string()),
                role: Role::User,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok(user)
    }

    /// Check credentials and issue a JWT
    pub async fn login(&self, email_or_username: &str, password: &str) -> AppResult<(String, User)> {
        let login = email_or_username.trim();
        if login.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email or username and password are required".to_string(),
            ));
        }

        let user = self
            .repository
            .users
            .find_by_login(login)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(&user, password)? {
            tracing::warn!(user_id = user.id, "Failed login attempt");
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        let token = self.create_token(&user)?;
        Ok((token, user))
    }

    /// Resolve a bearer token to the user it was issued for.
    /// The role is read from the directory, not from the token.
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        match self.repository.users.get_by_id(claims.user_id).await {
            Ok(user) => Ok(user),
            Err(AppError::NotFound(_)) => Err(AppError::Authentication(
                "User no longer exists".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    pub async fn get_for(&self, actor: Principal, id: i32) -> AppResult<User> {
        actor.require_owner_or_admin(id)?;
        self.repository.users.get_by_id(id).await
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    pub async fn delete(&self, actor: Principal, id: i32) -> AppResult<User> {
        actor.require_admin()?;
        if actor.id == id {
            return Err(AppError::Authorization("You cannot delete your own account".to_string()));
        }

        let user = self.repository.users.delete(id).await?;
        tracing::info!(user_id = id, deleted_by = actor.id, "User deleted");
        Ok(user)
    }

    /// Create the configured admin account if no user owns its username yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<Option<User>> {
        let Some(admin) = &self.config.bootstrap_admin else {
            return Ok(None);
        };

        if self.repository.users.find_by_login(&admin.username).await?.is_some() {
            return Ok(None);
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                first_name: admin.first_name.clone(),
                last_name: admin.last_name.clone(),
                email: admin.email.trim().to_lowercase(),
                username: admin.username.clone(),
                password_hash: hash_password(&admin.password)?,
                contact: None,
                position: "Administrator".to_string(),
                role: Role::Admin,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "Bootstrap admin created");
        Ok(Some(user))
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}

fn verify_password(user: &User, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{BootstrapAdmin, WorkflowConfig},
        models::borrow_request::{BorrowStatus, Decision},
        services::{
            approvals::ApprovalService,
            test_support::{admin, next_week, seed_equipment, seed_request, seed_user},
        },
    };

    fn service(bootstrap_admin: Option<BootstrapAdmin>) -> UsersService {
        UsersService::new(
            Repository::in_memory(),
            AuthConfig {
                jwt_secret: "test-secret".into(),
                jwt_expiration_hours: 1,
                bootstrap_admin,
            },
        )
    }

    fn registration(username: &str, email: &str) -> RegisterUser {
        RegisterUser {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: email.into(),
            username: username.into(),
            password: "secret".into(),
            contact: None,
            position: None,
        }
    }

    #[tokio::test]
    async fn register_then_login_by_email_or_username() {
        let users = service(None);
        let user = users.register(registration("ada", "Ada@Example.com")).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.position, "Employee");
        assert_eq!(user.email, "ada@example.com");

        let (token, by_name) = users.login("ada", "secret").await.unwrap();
        assert_eq!(by_name.id, user.id);
        let (_, by_email) = users.login("ADA@example.com", "secret").await.unwrap();
        assert_eq!(by_email.id, user.id);

        let resolved = users.authenticate(&token).await.unwrap();
        assert_eq!(resolved.principal(), user.principal());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_login_look_the_same() {
        let users = service(None);
        users.register(registration("ada", "ada@example.com")).await.unwrap();

        for (login, password) in [("ada", "nope"), ("bob", "secret")] {
            let err = users.login(login, password).await.unwrap_err();
            assert!(matches!(err, AppError::Authentication(ref m) if m == "Invalid credentials"));
        }
        assert!(matches!(
            users.login("", "secret").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_or_username_conflicts() {
        let users = service(None);
        users.register(registration("ada", "ada@example.com")).await.unwrap();

        let err = users.register(registration("ada", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = users.register(registration("other", "ADA@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn malformed_registration_is_rejected() {
        let users = service(None);
        let err = users.register(registration("ada", "not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("valid email")));
    }

    #[tokio::test]
    async fn token_of_deleted_user_no_longer_authenticates() {
        let users = service(None);
        let user = users.register(registration("ada", "ada@example.com")).await.unwrap();
        let (token, _) = users.login("ada", "secret").await.unwrap();

        let admin = Principal { id: 0, role: Role::Admin };
        users.delete(admin, user.id).await.unwrap();

        assert!(matches!(
            users.authenticate(&token).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn deleting_a_borrower_keeps_their_loans_returnable() {
        let repo = Repository::in_memory();
        let users = UsersService::new(
            repo.clone(),
            AuthConfig {
                jwt_secret: "test-secret".into(),
                jwt_expiration_hours: 1,
                bootstrap_admin: None,
            },
        );
        let approvals = ApprovalService::new(repo.clone(), WorkflowConfig::default());

        let alice = seed_user(&repo, "alice").await;
        let item = seed_equipment(&repo, "SN-1", 5).await;
        let request = seed_request(&repo, alice.id, item.id, 3, next_week()).await;
        approvals
            .decide(request.id, Decision::Approve, admin())
            .await
            .unwrap();
        assert_eq!(repo.equipment.get_by_id(item.id).await.unwrap().quantity, 2);

        users.delete(admin(), alice.id).await.unwrap();

        let kept = repo.borrow_requests.get_by_id(request.id).await.unwrap();
        assert_eq!(kept.status, BorrowStatus::Approved);
        assert_eq!(kept.user_id, alice.id);

        let movement = approvals.return_equipment(request.id, admin()).await.unwrap();
        assert!(movement.request.returned_at.is_some());
        assert_eq!(movement.equipment.quantity, 5);
    }

    #[tokio::test]
    async fn admins_cannot_delete_themselves() {
        let users = service(None);
        let admin = Principal { id: 5, role: Role::Admin };
        assert!(matches!(
            users.delete(admin, 5).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let users = service(Some(BootstrapAdmin {
            username: "root".into(),
            email: "root@example.com".into(),
            password: "rootpw".into(),
            first_name: "System".into(),
            last_name: "Administrator".into(),
        }));

        let created = users.ensure_bootstrap_admin().await.unwrap().unwrap();
        assert_eq!(created.role, Role::Admin);
        assert!(users.ensure_bootstrap_admin().await.unwrap().is_none());

        let (_, user) = users.login("root", "rootpw").await.unwrap();
        assert!(user.principal().is_admin());
    }
}
