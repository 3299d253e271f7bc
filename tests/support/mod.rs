#![allow(dead_code)]

pub mod helpers;
pub mod mock_adapter;
pub mod mock_worker;
