//! Procedure sets served by this server: the NFSv3 program (100003) and the
//! MOUNTv3 program (100005).

pub mod mount;
pub mod v3;
