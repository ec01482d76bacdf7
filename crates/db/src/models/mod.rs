pub mod assessment;
pub mod attempt;
pub mod dispute;
pub mod domain;
pub mod group;
pub mod result;
pub mod skill;
pub mod skill_level;
pub mod source;
pub mod user;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
