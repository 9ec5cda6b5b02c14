use chrono::Utc;
use secrecy::SecretString;
use tracing::{info, instrument};

use forum_core::AuthenticatedUser;

use crate::database::Database;
use crate::error::StoreError;
use crate::password;

/// Registration data. The password is hashed before it touches the database.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub nickname: String,
    pub age: String,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Debug)]
pub struct UserRow {
    pub id: i64,
    pub nickname: String,
    pub age: String,
    pub gender: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: String,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user. Nickname and email are unique; a duplicate of either
    /// is a `Conflict`.
    #[instrument(skip(self, user), fields(nickname = %user.nickname))]
    pub fn create(&self, user: &NewUser) -> Result<UserRow, StoreError> {
        let password_hash = password::hash_password(&user.password)?;
        let now = Utc::now().to_rfc3339();

        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (nickname, age, gender, first_name, last_name, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.nickname,
                    user.age,
                    user.gender,
                    user.first_name,
                    user.last_name,
                    user.email,
                    password_hash,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(user_id = id, "user registered");

        Ok(UserRow {
            id,
            nickname: user.nickname.clone(),
            age: user.age.clone(),
            gender: user.gender.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            created_at: now,
        })
    }

    /// Check credentials. `login` may be either the nickname or the email.
    /// Unknown user and wrong password are indistinguishable to the caller.
    #[instrument(skip(self, password))]
    pub fn authenticate(
        &self,
        login: &str,
        password: &SecretString,
    ) -> Result<AuthenticatedUser, StoreError> {
        let found = self.db.with_conn(|conn| {
            match conn.query_row(
                "SELECT id, nickname, email, password_hash FROM users
                 WHERE nickname = ?1 OR email = ?1 LIMIT 1",
                [login],
                |row| {
                    Ok((
                        AuthenticatedUser {
                            id: row.get(0)?,
                            nickname: row.get(1)?,
                            email: row.get(2)?,
                        },
                        row.get::<_, String>(3)?,
                    ))
                },
            ) {
                Ok(found) => Ok(Some(found)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        let Some((user, stored_hash)) = found else {
            return Err(StoreError::InvalidCredentials);
        };

        if password::verify_password(password, &stored_hash)? {
            Ok(user)
        } else {
            Err(StoreError::InvalidCredentials)
        }
    }
}
