use unleash::{Context, Parameters, StrategyRegistry};

pub fn main() {
    env_logger::init();

    let url = std::env::var("UNLEASH_URL")
        .unwrap_or_else(|_| "http://localhost:4242/api/client/features".to_owned());

    let mut strategies = StrategyRegistry::new();
    strategies.register("userWithId", |params: &Parameters, context: &Context| {
        let Some(user_id) = context.user_id.as_deref() else {
            return false;
        };
        params
            .get("userIds")
            .is_some_and(|ids| ids.split(',').any(|id| id.trim() == user_id))
    });

    let mut config = unleash::ClientConfig::new(url)
        .app_name("simple-demo")
        .strategies(strategies);
    if let Ok(api_key) = std::env::var("UNLEASH_API_KEY") {
        config = config.api_key(api_key);
    }
    let client = config.to_client().unwrap();

    let context = Context::new().with_user_id("test-subject");
    let enabled = client
        .is_feature_enabled("a-boolean-flag", &context, &[])
        // default value
        .unwrap_or(false);

    println!("Enabled: {:?}", enabled);

    // Refresh ahead of expiry, as a web server would after sending a response.
    if let Some(refresh) = client.refresh_trigger().request_finished() {
        let _ = refresh.join();
    }
}
