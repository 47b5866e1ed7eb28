//! Kullback-Leibler scoring of kinase PWMs against phospho-module PWMs, with
//! shuffle-based null distributions and empirical FDR estimation

pub mod config;
pub mod divergence;
pub mod error;
pub mod fasta;
pub mod fdr;
pub mod pipeline;
pub mod pwm;
pub mod scores;
pub mod shuffle;
pub mod types;
