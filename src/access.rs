use argon2::{Variant, Version};
use async_trait::async_trait;
use derive_more::{Deref, Display};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::*;
use typesafe_repository::macros::Id;
use typesafe_repository::prelude::*;

pub const PASSWORD_LENGTH: u32 = 64;
pub const MIN_PASSWORD_LENGTH: u32 = 5;
pub const DEFAULT_ARGON_CONFIG: argon2::Config = argon2::Config {
    variant: Variant::Argon2i,
    version: Version::Version13,
    mem_cost: 65535,
    time_cost: 10,
    lanes: 4,
    secret: &[],
    ad: &[],
    hash_length: PASSWORD_LENGTH,
};

pub fn generate_salt() -> Salt {
    let mut salt = [0; 512];
    StdRng::from_entropy().fill_bytes(&mut salt);
    salt
}

pub type Salt = [u8; 512];

#[derive(
    Deref, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display,
)]
pub struct Login(pub String);

#[derive(Id, Serialize, Deserialize, Debug, Clone)]
#[Id(ref_id, get_id)]
pub struct UserCredentials {
    #[id]
    pub login: Login,
    pub password: Password,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserCredentials {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize, Display)]
pub enum Role {
    Customer,
    Admin,
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "Customer" => Ok(Self::Customer),
            "Admin" => Ok(Self::Admin),
            _ => Err(s),
        }
    }
}

#[derive(Clone, Debug, Deref, Serialize, Deserialize, PartialEq)]
pub struct Password {
    #[deref]
    password: String,
    #[serde(with = "serde_arrays")]
    salt: Salt,
}

impl Password {
    pub fn new(password: String, salt: Salt) -> Result<Password, anyhow::Error> {
        if password.len() < MIN_PASSWORD_LENGTH as usize {
            return Err(anyhow::anyhow!(
                "Password cannot be shorter than {MIN_PASSWORD_LENGTH}"
            ));
        }
        Ok(Self { password, salt })
    }
    pub fn check(&self, input: &String) -> Result<bool, anyhow::Error> {
        Ok(argon2::verify_encoded(&self.password, input.as_bytes())?)
    }
    pub fn generate(input: String, salt: Salt) -> Result<Password, anyhow::Error> {
        let password = argon2::hash_encoded(input.as_bytes(), &salt, &DEFAULT_ARGON_CONFIG)?;
        Ok(Self { password, salt })
    }
    pub fn salt(&self) -> &Salt {
        &self.salt
    }
    pub fn password(&self) -> &String {
        &self.password
    }
}

#[async_trait]
pub trait AccessRepository:
    Repository<UserCredentials, Error = anyhow::Error>
    + Save<UserCredentials>
    + Get<UserCredentials>
    + Send
    + Sync
{
}

pub struct SqliteAccessRepository {
    conn: Connection,
}

impl SqliteAccessRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            let _ = conn.pragma_update(None, "journal_mode", &"WAL");
            let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
            conn.execute(
                "CREATE TABLE IF NOT EXISTS user_credentials (
                    login TEXT PRIMARY KEY,
                    password TEXT NOT NULL,
                    salt BLOB NOT NULL,
                    role TEXT NOT NULL DEFAULT 'Customer',
                    created_at INTEGER NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn row_to_credentials(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserCredentials> {
    let password: String = row.get(1)?;
    let salt: Vec<u8> = row.get(2)?;
    let salt: Salt = salt.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Blob,
            "bad salt length".into(),
        )
    })?;
    let role: String = row.get(3)?;
    Ok(UserCredentials {
        login: Login(row.get(0)?),
        password: Password { password, salt },
        role: Role::try_from(role).unwrap_or(Role::Customer),
        created_at: row.get(4)?,
    })
}

impl Repository<UserCredentials> for SqliteAccessRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<UserCredentials> for SqliteAccessRepository {
    async fn save(&self, u: UserCredentials) -> Result<(), Self::Error> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO user_credentials
                        (login, password, salt, role, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        u.login.0,
                        u.password.password(),
                        u.password.salt().as_slice(),
                        u.role.to_string(),
                        u.created_at
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<UserCredentials> for SqliteAccessRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<UserCredentials>,
    ) -> Result<Option<UserCredentials>, Self::Error> {
        let login = id.0.clone();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT login, password, salt, role, created_at
                        FROM user_credentials WHERE login = ?1",
                )?;
                let mut u = stmt
                    .query_map([&login], row_to_credentials)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(u.pop())
            })
            .await?)
    }
}

impl AccessRepository for SqliteAccessRepository {}

#[cfg(test)]
pub mod test {

    use super::*;

    #[test]
    fn rejects_short_passwords() {
        let salt = generate_salt();
        assert!(Password::new("abc".to_string(), salt).is_err());
        assert!(Password::new("long enough".to_string(), salt).is_ok());
    }

    #[test]
    fn verifies_generated_password() {
        let salt = generate_salt();
        let password = Password::generate("hunter22".to_string(), salt).expect("hash");
        assert!(password.check(&"hunter22".to_string()).expect("verify"));
        assert!(!password.check(&"hunter23".to_string()).expect("verify"));
    }
}
