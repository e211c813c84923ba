//! An MNIST digit-classification walkthrough built on [burn](https://burn.dev).
//!
//! The pipeline is the classic one: download and decode the dataset, look at
//! a few samples, define a small convolutional network, train it (one epoch
//! by default), and measure test accuracy. The tensor math, autograd, and
//! optimizer all belong to burn; this crate sequences the calls.

pub mod backend;
pub mod cli;
pub mod data;
pub mod inference;
pub mod model;
pub mod training;
pub mod visualize;
