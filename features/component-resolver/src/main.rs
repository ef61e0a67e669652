use std::{error::Error, sync::Arc, time::Duration};

use component_resolver::{
    Component, Dependencies, Injected, InstanceFactory, RequireError, Resolver,
};

fn main() -> Result<(), Box<dyn Error>> {
    let config = Component::labeled_value(
        "Config",
        Config {
            url: "sqlite::memory:".to_string(),
        },
    );
    let database = Component::async_factory(|injected: Injected| async move {
        let config = injected.get::<Config>(0)?;
        Ok::<_, RequireError>(Database {
            url: config.url.clone(),
        })
    })
    .label("Database")
    .depends_on(&config)
    .build();
    let repository = Component::instance_factory(RepositoryFactory {
        database: database.clone(),
    });

    let resolver = Resolver::builder()
        .resolve_timeout(Duration::from_secs(1))
        .build();

    let [repository, database] =
        futures::executor::block_on(resolver.get([repository, database]))?;

    let repository = repository.downcast::<Repository>()?;
    println!("{resolver:?}");
    println!("{repository:?}");
    println!("database url: {}", repository.database.url);
    println!(
        "shared database: {}",
        Arc::ptr_eq(&repository.database, &database.downcast::<Database>()?)
    );

    Ok(())
}

#[derive(Debug)]
struct Config {
    url: String,
}

#[derive(Debug)]
struct Database {
    url: String,
}

#[derive(Debug)]
struct Repository {
    database: Arc<Database>,
}
struct RepositoryFactory {
    database: Component,
}
impl InstanceFactory for RepositoryFactory {
    type Provides = Repository;

    fn label(&self) -> String {
        "Repository".to_string()
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::from(&self.database)
    }

    async fn construct(&self, injected: Injected) -> Result<Self::Provides, RequireError> {
        Ok(Repository {
            database: injected.get(0)?,
        })
    }
}
