crate::define_resource_types! {
    /// Every resource type the system knows, keyed by its exact infrastructure-as-code identifier
    ResourceType {
        // AWS
        AwsInstance => "aws_instance" : Aws / Compute,
        AwsLaunchTemplate => "aws_launch_template" : Aws / Compute,
        AwsAutoscalingGroup => "aws_autoscaling_group" : Aws / Compute,
        AwsLambdaFunction => "aws_lambda_function" : Aws / Compute,
        AwsEcsCluster => "aws_ecs_cluster" : Aws / Container,
        AwsEcsService => "aws_ecs_service" : Aws / Container,
        AwsEcsTaskDefinition => "aws_ecs_task_definition" : Aws / Container,
        AwsEcrRepository => "aws_ecr_repository" : Aws / Container,
        AwsApprunnerService => "aws_apprunner_service" : Aws / Container,
        AwsEksCluster => "aws_eks_cluster" : Aws / Kubernetes,
        AwsEksNodeGroup => "aws_eks_node_group" : Aws / Kubernetes,
        AwsS3Bucket => "aws_s3_bucket" : Aws / ObjectStorage,
        AwsEbsVolume => "aws_ebs_volume" : Aws / BlockStorage,
        AwsEfsFileSystem => "aws_efs_file_system" : Aws / FileStorage,
        AwsDbInstance => "aws_db_instance" : Aws / SqlDatabase,
        AwsRdsCluster => "aws_rds_cluster" : Aws / SqlDatabase,
        AwsRedshiftCluster => "aws_redshift_cluster" : Aws / SqlDatabase,
        AwsDynamodbTable => "aws_dynamodb_table" : Aws / NoSqlDatabase,
        AwsDocdbCluster => "aws_docdb_cluster" : Aws / NoSqlDatabase,
        AwsElasticacheCluster => "aws_elasticache_cluster" : Aws / Cache,
        AwsElasticacheReplicationGroup => "aws_elasticache_replication_group" : Aws / Cache,
        AwsMemorydbCluster => "aws_memorydb_cluster" : Aws / Cache,
        AwsSqsQueue => "aws_sqs_queue" : Aws / Queue,
        AwsMqBroker => "aws_mq_broker" : Aws / Queue,
        AwsSnsTopic => "aws_sns_topic" : Aws / PubSub,
        AwsKinesisStream => "aws_kinesis_stream" : Aws / Stream,
        AwsKinesisFirehoseDeliveryStream => "aws_kinesis_firehose_delivery_stream" : Aws / Stream,
        AwsMskCluster => "aws_msk_cluster" : Aws / Stream,
        AwsCloudwatchEventBus => "aws_cloudwatch_event_bus" : Aws / EventBus,
        AwsCloudwatchEventRule => "aws_cloudwatch_event_rule" : Aws / EventBus,
        AwsSecretsmanagerSecret => "aws_secretsmanager_secret" : Aws / Secrets,
        AwsKmsKey => "aws_kms_key" : Aws / KeyManagement,
        AwsSsmParameter => "aws_ssm_parameter" : Aws / Configuration,
        AwsAppconfigApplication => "aws_appconfig_application" : Aws / Configuration,
        AwsCognitoUserPool => "aws_cognito_user_pool" : Aws / Identity,
        AwsCognitoUserPoolClient => "aws_cognito_user_pool_client" : Aws / Identity,
        AwsCognitoIdentityPool => "aws_cognito_identity_pool" : Aws / Identity,
        AwsIamRole => "aws_iam_role" : Aws / Iam,
        AwsIamPolicy => "aws_iam_policy" : Aws / Iam,
        AwsIamUser => "aws_iam_user" : Aws / Iam,
        AwsVpc => "aws_vpc" : Aws / Networking,
        AwsSubnet => "aws_subnet" : Aws / Networking,
        AwsSecurityGroup => "aws_security_group" : Aws / Networking,
        AwsNatGateway => "aws_nat_gateway" : Aws / Networking,
        AwsLb => "aws_lb" : Aws / LoadBalancer,
        AwsElb => "aws_elb" : Aws / LoadBalancer,
        AwsRoute53Zone => "aws_route53_zone" : Aws / Dns,
        AwsRoute53Record => "aws_route53_record" : Aws / Dns,
        AwsCloudfrontDistribution => "aws_cloudfront_distribution" : Aws / Cdn,
        AwsApiGatewayRestApi => "aws_api_gateway_rest_api" : Aws / ApiGateway,
        AwsApigatewayv2Api => "aws_apigatewayv2_api" : Aws / ApiGateway,
        AwsCloudwatchMetricAlarm => "aws_cloudwatch_metric_alarm" : Aws / Monitoring,
        AwsCloudwatchDashboard => "aws_cloudwatch_dashboard" : Aws / Monitoring,
        AwsCloudwatchLogGroup => "aws_cloudwatch_log_group" : Aws / Logging,
        AwsOpensearchDomain => "aws_opensearch_domain" : Aws / Search,
        AwsElasticsearchDomain => "aws_elasticsearch_domain" : Aws / Search,
        AwsEmrCluster => "aws_emr_cluster" : Aws / Analytics,
        AwsSfnStateMachine => "aws_sfn_state_machine" : Aws / Workflow,

        // GCP
        GoogleComputeInstance => "google_compute_instance" : Gcp / Compute,
        GoogleComputeInstanceTemplate => "google_compute_instance_template" : Gcp / Compute,
        GoogleCloudfunctionsFunction => "google_cloudfunctions_function" : Gcp / Compute,
        GoogleCloudfunctions2Function => "google_cloudfunctions2_function" : Gcp / Compute,
        GoogleCloudRunService => "google_cloud_run_service" : Gcp / Container,
        GoogleCloudRunV2Service => "google_cloud_run_v2_service" : Gcp / Container,
        GoogleArtifactRegistryRepository => "google_artifact_registry_repository" : Gcp / Container,
        GoogleContainerCluster => "google_container_cluster" : Gcp / Kubernetes,
        GoogleContainerNodePool => "google_container_node_pool" : Gcp / Kubernetes,
        GoogleStorageBucket => "google_storage_bucket" : Gcp / ObjectStorage,
        GoogleComputeDisk => "google_compute_disk" : Gcp / BlockStorage,
        GoogleFilestoreInstance => "google_filestore_instance" : Gcp / FileStorage,
        GoogleSqlDatabaseInstance => "google_sql_database_instance" : Gcp / SqlDatabase,
        GoogleSqlDatabase => "google_sql_database" : Gcp / SqlDatabase,
        GoogleAlloydbCluster => "google_alloydb_cluster" : Gcp / SqlDatabase,
        GoogleSpannerInstance => "google_spanner_instance" : Gcp / SqlDatabase,
        GoogleFirestoreDatabase => "google_firestore_database" : Gcp / NoSqlDatabase,
        GoogleBigtableInstance => "google_bigtable_instance" : Gcp / NoSqlDatabase,
        GoogleRedisInstance => "google_redis_instance" : Gcp / Cache,
        GoogleMemcacheInstance => "google_memcache_instance" : Gcp / Cache,
        GoogleCloudTasksQueue => "google_cloud_tasks_queue" : Gcp / Queue,
        GooglePubsubSubscription => "google_pubsub_subscription" : Gcp / Queue,
        GooglePubsubTopic => "google_pubsub_topic" : Gcp / PubSub,
        GooglePubsubLiteTopic => "google_pubsub_lite_topic" : Gcp / Stream,
        GoogleEventarcTrigger => "google_eventarc_trigger" : Gcp / EventBus,
        GoogleSecretManagerSecret => "google_secret_manager_secret" : Gcp / Secrets,
        GoogleKmsKeyRing => "google_kms_key_ring" : Gcp / KeyManagement,
        GoogleKmsCryptoKey => "google_kms_crypto_key" : Gcp / KeyManagement,
        GoogleRuntimeconfigConfig => "google_runtimeconfig_config" : Gcp / Configuration,
        GoogleIdentityPlatformConfig => "google_identity_platform_config" : Gcp / Identity,
        GoogleIdentityPlatformTenant => "google_identity_platform_tenant" : Gcp / Identity,
        GoogleServiceAccount => "google_service_account" : Gcp / Iam,
        GoogleProjectIamMember => "google_project_iam_member" : Gcp / Iam,
        GoogleComputeNetwork => "google_compute_network" : Gcp / Networking,
        GoogleComputeSubnetwork => "google_compute_subnetwork" : Gcp / Networking,
        GoogleComputeFirewall => "google_compute_firewall" : Gcp / Networking,
        GoogleComputeForwardingRule => "google_compute_forwarding_rule" : Gcp / LoadBalancer,
        GoogleComputeBackendService => "google_compute_backend_service" : Gcp / LoadBalancer,
        GoogleDnsManagedZone => "google_dns_managed_zone" : Gcp / Dns,
        GoogleDnsRecordSet => "google_dns_record_set" : Gcp / Dns,
        GoogleComputeBackendBucket => "google_compute_backend_bucket" : Gcp / Cdn,
        GoogleApiGatewayApi => "google_api_gateway_api" : Gcp / ApiGateway,
        GoogleMonitoringAlertPolicy => "google_monitoring_alert_policy" : Gcp / Monitoring,
        GoogleMonitoringDashboard => "google_monitoring_dashboard" : Gcp / Monitoring,
        GoogleLoggingProjectSink => "google_logging_project_sink" : Gcp / Logging,
        GoogleLoggingProjectBucketConfig => "google_logging_project_bucket_config" : Gcp / Logging,
        GoogleBigqueryDataset => "google_bigquery_dataset" : Gcp / Analytics,
        GoogleWorkflowsWorkflow => "google_workflows_workflow" : Gcp / Workflow,

        // Azure
        AzurermLinuxVirtualMachine => "azurerm_linux_virtual_machine" : Azure / Compute,
        AzurermWindowsVirtualMachine => "azurerm_windows_virtual_machine" : Azure / Compute,
        AzurermLinuxVirtualMachineScaleSet => "azurerm_linux_virtual_machine_scale_set" : Azure / Compute,
        AzurermFunctionApp => "azurerm_function_app" : Azure / Compute,
        AzurermLinuxFunctionApp => "azurerm_linux_function_app" : Azure / Compute,
        AzurermWindowsFunctionApp => "azurerm_windows_function_app" : Azure / Compute,
        AzurermContainerGroup => "azurerm_container_group" : Azure / Container,
        AzurermContainerApp => "azurerm_container_app" : Azure / Container,
        AzurermContainerRegistry => "azurerm_container_registry" : Azure / Container,
        AzurermLinuxWebApp => "azurerm_linux_web_app" : Azure / Container,
        AzurermKubernetesCluster => "azurerm_kubernetes_cluster" : Azure / Kubernetes,
        AzurermStorageAccount => "azurerm_storage_account" : Azure / ObjectStorage,
        AzurermStorageContainer => "azurerm_storage_container" : Azure / ObjectStorage,
        AzurermManagedDisk => "azurerm_managed_disk" : Azure / BlockStorage,
        AzurermStorageShare => "azurerm_storage_share" : Azure / FileStorage,
        AzurermPostgresqlServer => "azurerm_postgresql_server" : Azure / SqlDatabase,
        AzurermPostgresqlFlexibleServer => "azurerm_postgresql_flexible_server" : Azure / SqlDatabase,
        AzurermMysqlServer => "azurerm_mysql_server" : Azure / SqlDatabase,
        AzurermMysqlFlexibleServer => "azurerm_mysql_flexible_server" : Azure / SqlDatabase,
        AzurermMariadbServer => "azurerm_mariadb_server" : Azure / SqlDatabase,
        AzurermMssqlServer => "azurerm_mssql_server" : Azure / SqlDatabase,
        AzurermMssqlDatabase => "azurerm_mssql_database" : Azure / SqlDatabase,
        AzurermCosmosdbAccount => "azurerm_cosmosdb_account" : Azure / NoSqlDatabase,
        AzurermRedisCache => "azurerm_redis_cache" : Azure / Cache,
        AzurermServicebusNamespace => "azurerm_servicebus_namespace" : Azure / Queue,
        AzurermServicebusQueue => "azurerm_servicebus_queue" : Azure / Queue,
        AzurermStorageQueue => "azurerm_storage_queue" : Azure / Queue,
        AzurermServicebusTopic => "azurerm_servicebus_topic" : Azure / PubSub,
        AzurermEventhub => "azurerm_eventhub" : Azure / Stream,
        AzurermEventhubNamespace => "azurerm_eventhub_namespace" : Azure / Stream,
        AzurermEventgridTopic => "azurerm_eventgrid_topic" : Azure / EventBus,
        AzurermEventgridDomain => "azurerm_eventgrid_domain" : Azure / EventBus,
        AzurermKeyVault => "azurerm_key_vault" : Azure / Secrets,
        AzurermKeyVaultSecret => "azurerm_key_vault_secret" : Azure / Secrets,
        AzurermKeyVaultKey => "azurerm_key_vault_key" : Azure / KeyManagement,
        AzurermAppConfiguration => "azurerm_app_configuration" : Azure / Configuration,
        AzurermAadb2cDirectory => "azurerm_aadb2c_directory" : Azure / Identity,
        AzurermRoleAssignment => "azurerm_role_assignment" : Azure / Iam,
        AzurermUserAssignedIdentity => "azurerm_user_assigned_identity" : Azure / Iam,
        AzurermVirtualNetwork => "azurerm_virtual_network" : Azure / Networking,
        AzurermSubnet => "azurerm_subnet" : Azure / Networking,
        AzurermNetworkSecurityGroup => "azurerm_network_security_group" : Azure / Networking,
        AzurermLb => "azurerm_lb" : Azure / LoadBalancer,
        AzurermApplicationGateway => "azurerm_application_gateway" : Azure / LoadBalancer,
        AzurermDnsZone => "azurerm_dns_zone" : Azure / Dns,
        AzurermCdnFrontdoorProfile => "azurerm_cdn_frontdoor_profile" : Azure / Cdn,
        AzurermApiManagement => "azurerm_api_management" : Azure / ApiGateway,
        AzurermMonitorMetricAlert => "azurerm_monitor_metric_alert" : Azure / Monitoring,
        AzurermMonitorActionGroup => "azurerm_monitor_action_group" : Azure / Monitoring,
        AzurermApplicationInsights => "azurerm_application_insights" : Azure / Monitoring,
        AzurermLogAnalyticsWorkspace => "azurerm_log_analytics_workspace" : Azure / Logging,
        AzurermSearchService => "azurerm_search_service" : Azure / Search,
        AzurermSynapseWorkspace => "azurerm_synapse_workspace" : Azure / Analytics,
        AzurermLogicAppWorkflow => "azurerm_logic_app_workflow" : Azure / Workflow,
    }
}

impl ResourceType {
    /// Functions-as-a-service and serverless container types.
    pub fn is_serverless(&self) -> bool {
        matches!(
            self,
            ResourceType::AwsLambdaFunction
                | ResourceType::GoogleCloudfunctionsFunction
                | ResourceType::GoogleCloudfunctions2Function
                | ResourceType::GoogleCloudRunService
                | ResourceType::GoogleCloudRunV2Service
                | ResourceType::AzurermFunctionApp
                | ResourceType::AzurermLinuxFunctionApp
                | ResourceType::AzurermWindowsFunctionApp
        )
    }
}
