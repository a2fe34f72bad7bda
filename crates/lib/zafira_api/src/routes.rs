//! Route paths, relative to the configured API prefix.

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_VERIFY_EMAIL: &str = "/auth/verify-email";
pub const POST_AUTH_RESEND_VERIFICATION: &str = "/auth/resend-verification";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const GET_AUTH_GOOGLE: &str = "/auth/google";
pub const GET_AUTH_GOOGLE_CALLBACK: &str = "/auth/google/callback";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";

pub const GET_USER: &str = "/user";
pub const GET_USER_BY_ID: &str = "/user/by-id/{id}";
pub const USER_ID: &str = "/user/{id}";

pub const GET_HEALTH: &str = "/health";
