pub mod tenant;

pub use tenant::{TenantContext, SCHOOL_ID_HEADER, USER_ID_HEADER};
