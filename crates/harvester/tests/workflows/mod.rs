use super::*;

mod resume;
