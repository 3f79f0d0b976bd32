// 📒 Book Entity - the single top-level container of a ledger file

use crate::guid::Guid;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub guid: Guid,
    pub root_account_guid: Guid,
    pub root_template_guid: Guid,
}
