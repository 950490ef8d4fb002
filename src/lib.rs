//! Stinkbug Racer - Race simulation core
//!
//! Provides the race simulation for the browser game and, with the
//! `desktop` feature, the Tauri commands the front-end talks to.

pub mod game_server;

pub use game_server::{
    ControlIntent, GameServer, GameState, Race, RaceConfig, RaceError, RaceSnapshot,
    TrackDefinition,
};

#[cfg(feature = "desktop")]
mod commands {
    use crate::game_server::race::{RaceConfig, RaceResult, RaceSnapshot};
    use crate::game_server::simulation::{GameServer, GameState, ServerStats};
    use crate::game_server::track::TrackDefinition;
    use crate::game_server::vehicle::ControlIntent;
    use std::sync::Mutex;
    use tauri::State;

    /// Initialize a new race, optionally from a JSON config
    #[tauri::command]
    pub fn init_race(
        server: State<'_, Mutex<GameServer>>,
        config_json: Option<String>,
    ) -> Result<(), String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;

        let config = match config_json {
            Some(json) => RaceConfig::from_json(&json).map_err(|e| e.to_string())?,
            None => RaceConfig::default(),
        };

        let bot_count = config.bot_count;
        server.init_race(config).map_err(|e| e.to_string())?;
        log::info!("Race initialized with {} bots", bot_count);
        Ok(())
    }

    /// Start the race countdown
    #[tauri::command]
    pub fn start_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;
        server.start_race().map_err(|e| e.to_string())?;
        log::info!("Race countdown started");
        Ok(())
    }

    /// Advance the simulation by `delta` seconds with this frame's input
    #[tauri::command]
    pub fn tick(
        server: State<'_, Mutex<GameServer>>,
        delta: f32,
        input: Option<ControlIntent>,
    ) -> Result<Option<RaceSnapshot>, String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.tick(delta, &input.unwrap_or_default()))
    }

    /// Get current race snapshot without advancing simulation
    #[tauri::command]
    pub fn get_snapshot(
        server: State<'_, Mutex<GameServer>>,
    ) -> Result<Option<RaceSnapshot>, String> {
        let server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.get_snapshot())
    }

    /// Get race results
    #[tauri::command]
    pub fn get_results(
        server: State<'_, Mutex<GameServer>>,
    ) -> Result<Option<Vec<RaceResult>>, String> {
        let server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.get_results())
    }

    /// Get the generated track geometry and navigation data
    #[tauri::command]
    pub fn get_track(
        server: State<'_, Mutex<GameServer>>,
    ) -> Result<Option<TrackDefinition>, String> {
        let server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.get_track().cloned())
    }

    /// Get server statistics
    #[tauri::command]
    pub fn get_stats(server: State<'_, Mutex<GameServer>>) -> Result<ServerStats, String> {
        let server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.get_stats())
    }

    /// Get current game state
    #[tauri::command]
    pub fn get_game_state(server: State<'_, Mutex<GameServer>>) -> Result<GameState, String> {
        let server = server.lock().map_err(|e| e.to_string())?;
        Ok(server.get_state())
    }

    /// Pause the simulation
    #[tauri::command]
    pub fn pause_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;
        server.pause();
        log::info!("Race paused");
        Ok(())
    }

    /// Resume the simulation
    #[tauri::command]
    pub fn resume_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;
        server.resume();
        log::info!("Race resumed");
        Ok(())
    }

    /// Reset to idle state
    #[tauri::command]
    pub fn reset_race(server: State<'_, Mutex<GameServer>>) -> Result<(), String> {
        let mut server = server.lock().map_err(|e| e.to_string())?;
        server.reset();
        log::info!("Race reset");
        Ok(())
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Mutex;

    tauri::Builder::default()
        .manage(Mutex::new(GameServer::new()))
        .setup(|app| {
            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .build(),
                )?;
            }
            log::info!("Stinkbug Racer simulation initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::init_race,
            commands::start_race,
            commands::tick,
            commands::get_snapshot,
            commands::get_results,
            commands::get_track,
            commands::get_stats,
            commands::get_game_state,
            commands::pause_race,
            commands::resume_race,
            commands::reset_race,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
