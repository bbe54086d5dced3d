pub(crate) mod export;
pub(crate) mod follow;
pub(crate) mod import;
pub(crate) mod limits;
pub(crate) mod lists;
pub(crate) mod meta;
pub(crate) mod shared;
