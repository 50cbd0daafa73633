//! 用户认证和授权

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use pathodx_core::{PathoError, Result, UserAccount, UserRole};
use pathodx_database::{DatabasePool, DatabaseQueries, NewUser};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 6;

/// 默认哈希迭代次数
pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;

/// 认证配置
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub hash_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "change-me".to_string(),
            token_ttl_hours: 24,
            hash_iterations: DEFAULT_HASH_ITERATIONS,
        }
    }
}

/// 已认证用户, 由中间件写入请求扩展
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
}

impl From<&UserAccount> for AuthenticatedUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }
}

/// 注册请求
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 用户信息（不包含敏感数据）
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<UserAccount> for UserInfo {
    fn from(user: UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// 登录响应
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
    pub expires_at: DateTime<Utc>,
}

/// 令牌声明
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,      // 用户ID
    username: String, // 用户名
    role: String,     // 角色
    exp: i64,         // 过期时间
    iat: i64,         // 签发时间
    jti: String,      // 令牌ID
}

/// 认证服务
#[derive(Debug, Clone)]
pub struct AuthService {
    db: DatabasePool,
    secret: String,
    token_ttl: Duration,
    iterations: u32,
}

impl AuthService {
    pub fn new(db: DatabasePool, config: AuthConfig) -> Self {
        Self {
            db,
            secret: config.token_secret,
            token_ttl: Duration::hours(config.token_ttl_hours),
            iterations: config.hash_iterations.max(1),
        }
    }

    /// 注册普通用户
    pub async fn register(&self, request: RegisterRequest) -> Result<UserAccount> {
        let username = request.username.trim().to_string();
        validate_username(&username)?;
        validate_password(&request.password)?;

        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&username)
            .to_string();
        if display_name.chars().count() > 64 {
            return Err(PathoError::Validation("显示名称不能超过64个字符".to_string()));
        }

        self.create_account(&username, &request.password, &display_name, UserRole::Standard)
            .await
    }

    async fn create_account(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
        role: UserRole,
    ) -> Result<UserAccount> {
        let password_hash = self.hash_password(password)?;
        let queries = DatabaseQueries::new(&self.db);
        let id = queries
            .create_user(&NewUser {
                username: username.to_string(),
                password_hash,
                display_name: display_name.to_string(),
                role,
            })
            .await?;

        queries
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| PathoError::Internal(format!("新建用户 {id} 读取失败")))
    }

    /// 用户登录
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let queries = DatabaseQueries::new(&self.db);
        let user = queries
            .get_user_by_username(request.username.trim())
            .await?
            .filter(|user| verify_password(&request.password, &user.password_hash))
            .ok_or_else(|| PathoError::Auth("用户名或密码错误".to_string()))?;

        let (token, expires_at) = self.issue_token(&user)?;

        Ok(LoginResponse {
            token,
            user: user.into(),
            expires_at,
        })
    }

    /// 签发令牌: `base64(claims).base64(hmac_sha256(secret, claims))`
    pub fn issue_token(&self, user: &UserAccount) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());
        Ok((format!("{payload}.{signature}"), expires_at))
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PathoError::Internal(format!("令牌密钥无效: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// 验证令牌并加载用户
    pub async fn verify_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let invalid = || PathoError::Auth("认证令牌无效或已过期".to_string());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        let claims_data = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&claims_data).map_err(|_| invalid())?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(invalid());
        }

        let user_id: i64 = claims.sub.parse().map_err(|_| invalid())?;
        let user = DatabaseQueries::new(&self.db)
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(invalid)?;

        Ok(AuthenticatedUser::from(&user))
    }

    /// 创建初始管理员账户, 已存在时跳过
    pub async fn seed_admin(&self, username: &str, password: &str, display_name: &str) -> Result<bool> {
        let queries = DatabaseQueries::new(&self.db);
        if queries.get_user_by_username(username).await?.is_some() {
            return Ok(false);
        }

        validate_username(username)?;
        validate_password(password)?;
        self.create_account(username, password, display_name, UserRole::Admin)
            .await?;

        info!("Created initial admin account: {}", username);
        Ok(true)
    }

    /// 生成密码哈希: `pbkdf2-sha256$<迭代次数>$<盐>$<哈希>`
    pub fn hash_password(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, self.iterations, &mut hash);

        Ok(format!(
            "{}${}${}${}",
            HASH_SCHEME,
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        ))
    }
}

/// 校验密码与存储的哈希是否一致
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }

    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        STANDARD_NO_PAD.decode(salt),
        STANDARD_NO_PAD.decode(hash),
    ) else {
        return false;
    };
    if iterations == 0 || expected.is_empty() {
        return false;
    }

    let mut actual = vec![0u8; expected.len()];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);
    bool::from(actual.ct_eq(&expected))
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(PathoError::Validation("用户名长度需为3到32个字符".to_string()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PathoError::Validation(
            "用户名只能包含字母、数字、下划线和连字符".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PathoError::Validation(format!(
            "密码长度不能少于{MIN_PASSWORD_LEN}位"
        )));
    }
    Ok(())
}

/// 认证中间件
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PathoError::Auth("缺少认证令牌".to_string()))?;

    let user = state.auth.verify_token(token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// 注册处理器
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let username = request.username.clone();
    match state.auth.register(request).await {
        Ok(user) => {
            info!("Registered user: {}", user.username);
            Ok((StatusCode::CREATED, Json(UserInfo::from(user))))
        }
        Err(e) => {
            warn!("Registration failed for {}: {}", username, e);
            Err(e.into())
        }
    }
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    info!("Login attempt for user: {}", request.username);

    match state.auth.login(request).await {
        Ok(response) => {
            info!("User logged in successfully: {}", response.user.username);
            Ok(Json(response))
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}

/// 获取当前用户信息
pub async fn current_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<impl IntoResponse> {
    let account = DatabaseQueries::new(&state.db)
        .get_user_by_id(user.id)
        .await?
        .ok_or_else(|| PathoError::Auth("用户不存在".to_string()))?;

    Ok(Json(UserInfo::from(account)))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> AuthService {
        let db = DatabasePool::in_memory().await.unwrap();
        DatabaseQueries::new(&db).create_tables().await.unwrap();
        AuthService::new(
            db,
            AuthConfig {
                token_secret: "test-secret".to_string(),
                token_ttl_hours: 1,
                hash_iterations: 1_000,
            },
        )
    }

    fn register(username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_password_hash_round_trip() {
        let auth = service().await;
        let hash = auth.hash_password("pw123456").unwrap();
        assert!(hash.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("pw123456", &hash));
        assert!(!verify_password("pw1234567", &hash));
        assert!(!verify_password("pw123456", "plain"));

        // 相同密码每次使用不同的盐
        assert_ne!(hash, auth.hash_password("pw123456").unwrap());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service().await;
        let user = auth.register(register("forensic1", "pw123456")).await.unwrap();
        assert_eq!(user.display_name, "forensic1");
        assert_eq!(user.role, UserRole::Standard);

        let response = auth
            .login(LoginRequest {
                username: "forensic1".to_string(),
                password: "pw123456".to_string(),
            })
            .await
            .unwrap();
        assert!(response.expires_at > Utc::now());

        let verified = auth.verify_token(&response.token).await.unwrap();
        assert_eq!(verified.id, user.id);
        assert_eq!(verified.username, "forensic1");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let auth = service().await;
        for request in [
            register("ab", "pw123456"),
            register("bad name", "pw123456"),
            register("forensic1", "12345"),
        ] {
            let result = auth.register(request).await;
            assert!(matches!(result, Err(PathoError::Validation(_))));
        }

        auth.register(register("forensic1", "pw123456")).await.unwrap();
        let duplicate = auth.register(register("forensic1", "pw654321")).await;
        assert!(matches!(duplicate, Err(PathoError::Validation(_))));
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_error() {
        let auth = service().await;
        auth.register(register("forensic1", "pw123456")).await.unwrap();

        for (username, password) in [("forensic1", "wrong-pw"), ("nobody", "pw123456")] {
            let result = auth
                .login(LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                })
                .await;
            assert!(matches!(result, Err(PathoError::Auth(_))));
        }
    }

    #[tokio::test]
    async fn test_tampered_and_foreign_tokens_rejected() {
        let auth = service().await;
        let user = auth.register(register("forensic1", "pw123456")).await.unwrap();
        let (token, _) = auth.issue_token(&user).unwrap();

        let (payload, signature) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            String::from_utf8(URL_SAFE_NO_PAD.decode(payload).unwrap())
                .unwrap()
                .replace("\"user\"", "\"admin\""),
        );

        let other = AuthService::new(
            auth.db.clone(),
            AuthConfig {
                token_secret: "other-secret".to_string(),
                ..AuthConfig::default()
            },
        );

        for bad in [
            format!("{forged_claims}.{signature}"),
            "garbage".to_string(),
            String::new(),
        ] {
            assert!(matches!(auth.verify_token(&bad).await, Err(PathoError::Auth(_))));
        }
        assert!(matches!(other.verify_token(&token).await, Err(PathoError::Auth(_))));
    }

    #[tokio::test]
    async fn test_token_signed_with_hmac() {
        use sha2::Digest;

        let auth = service().await;
        let user = auth.register(register("forensic1", "pw123456")).await.unwrap();
        let (token, _) = auth.issue_token(&user).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();

        let mut mac = HmacSha256::new_from_slice(b"test-secret").unwrap();
        mac.update(payload.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(signature, expected);

        // 简单拼接密钥的哈希不能通过校验
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        hasher.update(b".");
        hasher.update(b"test-secret");
        let concatenated = URL_SAFE_NO_PAD.encode(hasher.finalize());
        let result = auth.verify_token(&format!("{payload}.{concatenated}")).await;
        assert!(matches!(result, Err(PathoError::Auth(_))));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let mut auth = service().await;
        let user = auth.register(register("forensic1", "pw123456")).await.unwrap();
        auth.token_ttl = Duration::seconds(-1);
        let (token, _) = auth.issue_token(&user).unwrap();
        assert!(matches!(auth.verify_token(&token).await, Err(PathoError::Auth(_))));
    }

    #[tokio::test]
    async fn test_seed_admin_is_idempotent() {
        let auth = service().await;
        assert!(auth.seed_admin("admin", "admin123", "系统管理员").await.unwrap());
        assert!(!auth.seed_admin("admin", "other123", "系统管理员").await.unwrap());

        let response = auth
            .login(LoginRequest {
                username: "admin".to_string(),
                password: "admin123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.user.role, UserRole::Admin);
    }
}
