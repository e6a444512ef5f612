#[derive(Clone)]
struct AppState {
    inner: Arc<Mutex<EconomyApi>>,
    verifier: Arc<dyn IdentityVerifier + Send + Sync>,
}

impl AppState {
    fn new(api: EconomyApi, verifier: Arc<dyn IdentityVerifier + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(api)),
            verifier,
        }
    }
}
