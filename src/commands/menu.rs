use crate::models::menu::{MenuField, MenuRecord};
use crate::services::backend::MenuServer;

/// Menu backend shared by the search, cache and admin commands
#[derive(Clone)]
pub struct MenuState(pub MenuServer);

/// Search the menu by any field, e.g. `display_name` or `jan_code`
pub async fn search_menu(field: String, value: String, state: &MenuState) -> Result<Vec<MenuRecord>, String> {
    let field: MenuField = field.parse()?;
    state.0.search_menu(field, &value).await.map_err(|e| e.to_string())
}

pub async fn get_menu_cache(state: &MenuState) -> Result<Vec<MenuRecord>, String> {
    state.0.get_menu_cache().await.map_err(|e| e.to_string())
}

pub async fn add_menu_cache(record: MenuRecord, state: &MenuState) -> Result<Vec<MenuRecord>, String> {
    state.0.add_menu_cache(&record).await.map_err(|e| e.to_string())
}

pub async fn remove_menu_cache(field: String, value: String, state: &MenuState) -> Result<Vec<MenuRecord>, String> {
    let field: MenuField = field.parse()?;
    state.0.remove_menu_cache(field, &value).await.map_err(|e| e.to_string())
}

/// Admin: clear the recent-menu cache after the password checks out
pub async fn reset_menu_cache(password: String, state: &MenuState) -> Result<bool, String> {
    if !verify_admin_password(password, state).await? {
        return Err("Incorrect password".to_string());
    }
    state.0.reset_menu_cache().await.map_err(|e| e.to_string())
}

pub async fn verify_admin_password(password: String, state: &MenuState) -> Result<bool, String> {
    state.0.verify_password(&password).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ServerConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_for(mock: &MockServer) -> MenuState {
        MenuState(
            MenuServer::new(&ServerConfig {
                base_url: mock.uri(),
                ..ServerConfig::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_search_rejects_unknown_field() {
        let mock_server = MockServer::start().await;
        let err = search_menu("colour".into(), "red".into(), &state_for(&mock_server))
            .await
            .unwrap_err();
        assert!(err.contains("Unknown menu field"));
    }

    #[tokio::test]
    async fn test_reset_requires_password() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify_password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reset_menu_cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = reset_menu_cache("nope".into(), &state_for(&mock_server))
            .await
            .unwrap_err();
        assert_eq!(err, "Incorrect password");
    }

    #[tokio::test]
    async fn test_cache_error_is_stringified() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get_menu_cache"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&mock_server)
            .await;

        let err = get_menu_cache(&state_for(&mock_server)).await.unwrap_err();
        assert!(err.contains("HTTP 500"), "{}", err);
    }
}
