#![feature(proc_macro_hygiene, decl_macro)]


#[macro_use] extern crate rocket;


pub mod config;
pub mod error;
pub mod gateway;
pub mod geolocation;
pub mod logger;
pub mod map_view;
pub mod page_controller;
pub mod report_form;
pub mod report_route;
pub mod util;
