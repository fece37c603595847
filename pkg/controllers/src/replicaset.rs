use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use pkg_store::Store;
use pkg_types::pod::{Pod, PodSpec, PodStatus};
use pkg_types::replicaset::ReplicaSet;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// True iff every selector entry appears verbatim in the pod's labels.
/// An empty selector therefore matches every pod.
pub fn matches_selector(pod: &Pod, selector: &HashMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| pod.spec.labels.get(k) == Some(v))
}

/// Controller that reconciles ReplicaSets into Pods: counts live matching
/// pods, creates or deletes to reach the desired count, and records the
/// observed count back on the set.
///
/// Failed pods are excluded from the count, so a crashed pod is replaced
/// rather than counted.
pub struct ReplicaSetController {
    pods: Arc<dyn Store<Pod>>,
    replicasets: Arc<dyn Store<ReplicaSet>>,
    poll_interval: Duration,
}

impl ReplicaSetController {
    pub fn new(pods: Arc<dyn Store<Pod>>, replicasets: Arc<dyn Store<ReplicaSet>>) -> Self {
        Self {
            pods,
            replicasets,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "ReplicaSetController started (interval={}ms)",
                self.poll_interval.as_millis()
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.reconcile_all().await {
                    warn!("ReplicaSetController reconcile error: {}", e);
                }
            }
        })
    }

    /// One pass over all ReplicaSets; a failure on one set does not stop
    /// the others.
    pub async fn reconcile_all(&self) -> Result<()> {
        for rs in self.replicasets.list().await? {
            if let Err(e) = self.reconcile(&rs).await {
                warn!("Failed to reconcile replicaset {}: {}", rs.name, e);
            }
        }
        Ok(())
    }

    /// Diff live matching pods against the desired count, then write the
    /// observed count back.
    pub async fn reconcile(&self, rs: &ReplicaSet) -> Result<()> {
        let matching = self.matching_pods(rs).await?;
        let mut current = matching.len() as u32;
        let desired = rs.desired_count;

        if current < desired {
            let missing = desired - current;
            info!(
                "ReplicaSet {}: scaling up {} -> {}",
                rs.name, current, desired
            );
            for _ in 0..missing {
                self.create_pod(rs).await?;
            }
            current += missing;
        }

        if current > desired {
            let excess = current - desired;
            info!(
                "ReplicaSet {}: scaling down {} -> {}",
                rs.name, current, desired
            );
            for pod in matching.iter().take(excess as usize) {
                self.pods.delete(&pod.spec.name).await?;
            }
            current -= excess;
        }

        let mut rs = rs.clone();
        rs.current_count = current;
        let name = rs.name.clone();
        self.replicasets.put(&name, rs).await
    }

    async fn matching_pods(&self, rs: &ReplicaSet) -> Result<Vec<Pod>> {
        let pods = self.pods.list().await?;
        Ok(pods
            .into_iter()
            .filter(|p| p.status != PodStatus::Failed && matches_selector(p, &rs.selector))
            .collect())
    }

    async fn create_pod(&self, rs: &ReplicaSet) -> Result<()> {
        let name = generate_pod_name(&rs.name);
        let pod = Pod::new(PodSpec {
            name: name.clone(),
            image: rs.template.image.clone(),
            node_name: String::new(),
            command: rs.template.command.clone(),
            env: rs.template.env.clone(),
            // labels = selector, so the new pod matches back to this set
            labels: rs.selector.clone(),
        });
        info!("ReplicaSet {}: creating pod {}", rs.name, name);
        self.pods.put(&name, pod).await
    }
}

/// Set name plus a short random hex suffix.
fn generate_pod_name(rs_name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", rs_name, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_store::MemStore;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn make_pod(name: &str, pod_labels: HashMap<String, String>) -> Pod {
        Pod::new(PodSpec {
            name: name.to_string(),
            image: "alpine".to_string(),
            node_name: String::new(),
            command: vec![],
            env: HashMap::new(),
            labels: pod_labels,
        })
    }

    fn make_rs(name: &str, desired: u32, selector: HashMap<String, String>) -> ReplicaSet {
        ReplicaSet {
            name: name.to_string(),
            desired_count: desired,
            current_count: 0,
            selector,
            template: PodSpec {
                name: String::new(),
                image: "alpine".to_string(),
                node_name: String::new(),
                command: vec!["sleep".to_string(), "300".to_string()],
                env: HashMap::new(),
                labels: HashMap::new(),
            },
        }
    }

    fn make_controller() -> (
        ReplicaSetController,
        Arc<MemStore<Pod>>,
        Arc<MemStore<ReplicaSet>>,
    ) {
        let pods = Arc::new(MemStore::new());
        let replicasets = Arc::new(MemStore::new());
        let controller = ReplicaSetController::new(pods.clone(), replicasets.clone());
        (controller, pods, replicasets)
    }

    #[test]
    fn empty_selector_matches_every_pod() {
        let pod = make_pod("p", labels(&[("app", "web")]));
        assert!(matches_selector(&pod, &HashMap::new()));
    }

    #[test]
    fn selector_requires_every_entry() {
        let pod = make_pod("p", labels(&[("app", "web"), ("tier", "front")]));
        assert!(matches_selector(&pod, &labels(&[("app", "web")])));
        assert!(matches_selector(
            &pod,
            &labels(&[("app", "web"), ("tier", "front")])
        ));
        assert!(!matches_selector(&pod, &labels(&[("app", "api")])));
        assert!(!matches_selector(
            &pod,
            &labels(&[("app", "web"), ("zone", "eu")])
        ));
    }

    #[tokio::test]
    async fn scale_up_creates_matching_pending_pods() {
        let (controller, pods, replicasets) = make_controller();
        let rs = make_rs("web", 3, labels(&[("app", "web")]));
        replicasets.put("web", rs.clone()).await.unwrap();

        controller.reconcile(&rs).await.unwrap();

        let created = pods.list().await.unwrap();
        assert_eq!(created.len(), 3);
        for pod in &created {
            assert!(pod.spec.name.starts_with("web-"));
            assert_eq!(pod.status, PodStatus::Pending);
            assert_eq!(pod.spec.labels, rs.selector);
            assert_eq!(pod.spec.image, "alpine");
            assert_eq!(pod.spec.command, rs.template.command);
        }

        let stored = replicasets.get("web").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 3);
    }

    #[tokio::test]
    async fn scale_down_deletes_excess_pods() {
        let (controller, pods, replicasets) = make_controller();
        let rs = make_rs("web", 1, labels(&[("app", "web")]));
        replicasets.put("web", rs.clone()).await.unwrap();
        for i in 0..4 {
            let name = format!("web-{}", i);
            pods.put(&name, make_pod(&name, labels(&[("app", "web")])))
                .await
                .unwrap();
        }

        controller.reconcile(&rs).await.unwrap();

        assert_eq!(pods.list().await.unwrap().len(), 1);
        let stored = replicasets.get("web").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 1);
    }

    #[tokio::test]
    async fn failed_pods_are_replaced_not_counted() {
        let (controller, pods, replicasets) = make_controller();
        let rs = make_rs("web", 1, labels(&[("app", "web")]));
        replicasets.put("web", rs.clone()).await.unwrap();

        let mut dead = make_pod("web-dead", labels(&[("app", "web")]));
        dead.status = PodStatus::Failed;
        pods.put("web-dead", dead).await.unwrap();

        controller.reconcile(&rs).await.unwrap();

        let all = pods.list().await.unwrap();
        // replacement created; failed record left in place
        assert_eq!(all.len(), 2);
        let live: Vec<_> = all
            .iter()
            .filter(|p| p.status != PodStatus::Failed)
            .collect();
        assert_eq!(live.len(), 1);
        assert_ne!(live[0].spec.name, "web-dead");
    }

    #[tokio::test]
    async fn unrelated_pods_are_untouched() {
        let (controller, pods, replicasets) = make_controller();
        let rs = make_rs("web", 0, labels(&[("app", "web")]));
        replicasets.put("web", rs.clone()).await.unwrap();
        pods.put("other", make_pod("other", labels(&[("app", "api")])))
            .await
            .unwrap();

        controller.reconcile(&rs).await.unwrap();

        assert!(pods.get("other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_selector_claims_every_pod() {
        // Known sharp edge: an empty selector matches all pods, so a
        // scale-down deletes pods it never created.
        let (controller, pods, replicasets) = make_controller();
        let rs = make_rs("greedy", 0, HashMap::new());
        replicasets.put("greedy", rs.clone()).await.unwrap();
        pods.put("victim", make_pod("victim", labels(&[("app", "api")])))
            .await
            .unwrap();

        controller.reconcile(&rs).await.unwrap();

        assert!(pods.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn converged_set_only_refreshes_current_count() {
        let (controller, pods, replicasets) = make_controller();
        let mut rs = make_rs("web", 2, labels(&[("app", "web")]));
        rs.current_count = 99;
        replicasets.put("web", rs.clone()).await.unwrap();
        for name in ["web-a", "web-b"] {
            pods.put(name, make_pod(name, labels(&[("app", "web")])))
                .await
                .unwrap();
        }

        controller.reconcile(&rs).await.unwrap();

        assert_eq!(pods.list().await.unwrap().len(), 2);
        let stored = replicasets.get("web").await.unwrap().unwrap();
        assert_eq!(stored.current_count, 2);
    }
}
