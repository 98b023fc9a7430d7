#![allow(dead_code)]


pub(crate) use link::*;
