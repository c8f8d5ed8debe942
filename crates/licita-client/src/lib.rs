//! Licita Client - HTTP client for the Mercado Publico tender registry
//!
//! - [`mercado_publico`] - detail and listing-by-date endpoints
//!
//! # Overview
//!
//! The client builds requests, classifies each response for the retry loop
//! in `licita-core`, and maps upstream tenders into dataset records.

pub mod mercado_publico;

pub use mercado_publico::MercadoPublicoClient;
