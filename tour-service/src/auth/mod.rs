//! Authentication: password hashing, JWT handling and the request guard

pub mod guard;
pub mod password;
pub mod token;

pub use guard::{authenticate, changed_password_after, CurrentUser, MaybeUser};
pub use password::PasswordHasher;
pub use token::{extract_token, login_cookie, logout_cookie, Claims, JwtKeys, TOKEN_COOKIE};
