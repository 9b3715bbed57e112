//! End-to-end scenarios for the tcase engine, run through the local controller.

mod harness;
