pub mod scripted;

pub use scripted::ScriptedEngine;
