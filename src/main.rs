use std::env;
use std::str::FromStr;

use burn::backend::{Autodiff, NdArray};
use dotenv::dotenv;
use mbrl::dataset::unzip_transitions;
use mbrl::envs::PointMass;
use mbrl::{
    DatasetStatistics, ModelBasedPolicy, PolicyConfig, PolicyResult, TrainingMetrics, Transition,
    TransitionDataset,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

type TrainBackend = Autodiff<NdArray>;

fn get_env_var<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

/// `RUST_LOG` wins; otherwise this crate logs at info and dependencies at warn
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mbrl=info,warn"));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
    {
        eprintln!("logging already initialized: {}", e);
    }
}

/// Episodes driven by uniformly random actions, used to seed the dataset
fn collect_random(env: &PointMass, rng: &mut StdRng, episodes: usize) -> Vec<Transition> {
    let mut transitions = Vec::with_capacity(episodes * env.max_steps);
    for _ in 0..episodes {
        let mut state = env.reset(rng);
        for _ in 0..env.max_steps {
            let action = env.random_action(rng);
            let next_state = env.step(&state, &action);
            transitions.push(Transition {
                state: state.clone(),
                action,
                next_state: next_state.clone(),
            });
            state = next_state;
        }
    }
    transitions
}

/// One episode under the controller; returns its transitions and total cost
fn run_episode(
    policy: &mut ModelBasedPolicy<TrainBackend, PointMass>,
    rng: &mut StdRng,
) -> PolicyResult<(Vec<Transition>, f32)> {
    let env = policy.env().clone();
    let mut state = env.reset(rng);
    let mut transitions = Vec::with_capacity(env.max_steps);
    let mut total_cost = 0.0;

    for _ in 0..env.max_steps {
        let action = policy.get_action(&state)?;
        let next_state = env.step(&state, &action);
        total_cost += env.cost(&state, &action, &next_state);
        transitions.push(Transition {
            state: state.clone(),
            action,
            next_state: next_state.clone(),
        });
        state = next_state;
    }

    tracing::debug!(
        "episode finished at ({:.3}, {:.3})",
        state[0],
        state[1]
    );
    Ok((transitions, total_cost))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let seed: u64 = get_env_var("MBRL_SEED").unwrap_or(0);
    let iterations: usize = get_env_var("MBRL_ITERATIONS").unwrap_or(5);
    let train_steps: usize = get_env_var("MBRL_TRAIN_STEPS").unwrap_or(500);
    let batch_size: usize = get_env_var("MBRL_BATCH_SIZE").unwrap_or(512);
    let random_episodes: usize = get_env_var("MBRL_RANDOM_EPISODES").unwrap_or(10);
    let checkpoint = env::var("MBRL_CHECKPOINT").ok();

    let config = PolicyConfig::new()
        .with_horizon(get_env_var("MBRL_HORIZON").unwrap_or(15))
        .with_num_candidates(get_env_var("MBRL_NUM_CANDIDATES").unwrap_or(4096))
        .with_nn_layers(get_env_var("MBRL_NN_LAYERS").unwrap_or(1))
        .with_learning_rate(get_env_var("MBRL_LEARNING_RATE").unwrap_or(1e-3))
        .with_seed(Some(seed));

    tracing::info!("Policy config: {}", config);

    let env = PointMass::default();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut dataset = TransitionDataset::new();
    dataset.extend(collect_random(&env, &mut rng, random_episodes));
    let statistics = DatasetStatistics::from_transitions(dataset.transitions())?;
    tracing::info!("Collected {} random transitions", dataset.len());

    let mut policy =
        ModelBasedPolicy::<TrainBackend, _>::new(env, statistics, config, Default::default())?;
    let mut metrics = TrainingMetrics::new(train_steps.max(1));

    for iteration in 0..iterations {
        metrics.iteration = iteration;

        for _ in 0..train_steps {
            let (states, actions, next_states) =
                unzip_transitions(dataset.sample_batch(batch_size, &mut rng));
            let loss = policy.train_step(&states, &actions, &next_states)?;
            metrics.record_loss(loss);
        }

        let (transitions, cost) = run_episode(&mut policy, &mut rng)?;
        metrics.record_episode(cost, transitions.len());
        dataset.extend(transitions);

        metrics.log_to_console();
    }

    if let Some(path) = checkpoint {
        policy.save_model(&path)?;
    }

    tracing::info!("Done after {} iterations", iterations);
    Ok(())
}
